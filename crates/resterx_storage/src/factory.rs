//! Factory for building the storage manager from configuration
//!
//! MongoDB becomes primary with SQLite as fallback when a URI is configured
//! and the server answers; otherwise SQLite runs alone.

use crate::backend::Backend;
use crate::error::StorageResult;
use crate::manager::StorageManager;
use crate::mongo::MongoBackend;
use crate::sqlite::SqliteBackend;
use resterx_config::StorageConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Factory for creating storage managers
#[derive(Debug, Clone, Default)]
pub struct StorageFactory;

impl StorageFactory {
    pub fn new() -> Self {
        Self
    }

    /// Create a storage manager from a storage configuration
    ///
    /// # Errors
    ///
    /// Fails only if the SQLite store cannot be opened. A MongoDB server
    /// that is unreachable or cannot run transactions is logged and skipped.
    pub async fn from_storage_config(
        &self,
        config: &StorageConfig,
    ) -> StorageResult<StorageManager> {
        let op_timeout = Duration::from_secs(config.op_timeout_secs);
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

        let sqlite: Arc<dyn Backend> =
            Arc::new(SqliteBackend::connect(&config.sqlite_path, op_timeout).await?);

        if let Some(uri) = config.mongodb_uri.as_deref().filter(|u| !u.trim().is_empty()) {
            match MongoBackend::connect(uri, &config.mongodb_database, connect_timeout, op_timeout)
                .await
            {
                Ok(mongo) => return Ok(StorageManager::new(Arc::new(mongo), Some(sqlite))),
                Err(err) => warn!("MongoDB unavailable, using SQLite only: {}", err),
            }
        }

        Ok(StorageManager::new(sqlite, None))
    }
}

impl StorageManager {
    /// Builds the manager for `config`. Pair with [`Backend::close`] on shutdown.
    pub async fn init(config: &StorageConfig) -> StorageResult<Self> {
        StorageFactory::new().from_storage_config(config).await
    }
}
