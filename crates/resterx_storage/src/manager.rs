//! Failover façade over a primary and an optional fallback backend.

use crate::backend::{Backend, BackendKind};
use crate::error::{StorageError, StorageResult};
use crate::model::{
    Admission, Collection, Device, DeviceAdmission, Environment, HistoryEntry, Request,
    RoomRecord, SyncBatch,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Calls `$method` on the primary and, if it fails with an error that
/// [`StorageError::triggers_fallback`], repeats the call on the fallback.
/// Arguments are evaluated once per attempt.
macro_rules! route {
    ($self:ident, $method:ident ( $($arg:expr),* )) => {{
        match ($self.primary.$method($($arg),*).await, $self.fallback.as_ref()) {
            (Ok(value), _) => Ok(value),
            (Err(err), Some(fallback)) if err.triggers_fallback() => {
                warn!(
                    operation = stringify!($method),
                    primary = %$self.primary.kind(),
                    fallback = %fallback.kind(),
                    "Primary storage failed, retrying on fallback: {}",
                    err
                );
                fallback.$method($($arg),*).await
            }
            (Err(err), _) => {
                error!(operation = stringify!($method), "Storage call failed: {}", err);
                Err(err)
            }
        }
    }};
}

/// Routes every call primary-first, fallback-on-error.
///
/// Writes that land on the fallback are not copied back to the primary, and
/// the primary is never demoted: the next call tries it again.
#[derive(Clone)]
pub struct StorageManager {
    primary: Arc<dyn Backend>,
    fallback: Option<Arc<dyn Backend>>,
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("primary", &self.primary.kind())
            .field("fallback", &self.fallback.as_ref().map(|b| b.kind()))
            .finish()
    }
}

impl StorageManager {
    pub fn new(primary: Arc<dyn Backend>, fallback: Option<Arc<dyn Backend>>) -> Self {
        info!(
            "Storage manager using {} as primary{}",
            primary.kind(),
            fallback
                .as_ref()
                .map(|f| format!(", {} as fallback", f.kind()))
                .unwrap_or_default()
        );
        Self { primary, fallback }
    }

    pub fn primary_kind(&self) -> BackendKind {
        self.primary.kind()
    }

    pub fn fallback_kind(&self) -> Option<BackendKind> {
        self.fallback.as_ref().map(|b| b.kind())
    }
}

#[async_trait]
impl Backend for StorageManager {
    fn kind(&self) -> BackendKind {
        self.primary.kind()
    }

    async fn save_collection(&self, collection: Collection) -> StorageResult<Collection> {
        route!(self, save_collection(collection.clone()))
    }

    async fn get_collection(&self, id: &str) -> StorageResult<Collection> {
        route!(self, get_collection(id))
    }

    async fn get_collections_by_room(&self, room_id: &str) -> StorageResult<Vec<Collection>> {
        route!(self, get_collections_by_room(room_id))
    }

    async fn get_all_collections(&self) -> StorageResult<Vec<Collection>> {
        route!(self, get_all_collections())
    }

    async fn delete_collection(&self, id: &str) -> StorageResult<()> {
        route!(self, delete_collection(id))
    }

    async fn save_environment(&self, environment: Environment) -> StorageResult<Environment> {
        route!(self, save_environment(environment.clone()))
    }

    async fn get_environment(&self, id: &str) -> StorageResult<Environment> {
        route!(self, get_environment(id))
    }

    async fn get_environments_by_room(&self, room_id: &str) -> StorageResult<Vec<Environment>> {
        route!(self, get_environments_by_room(room_id))
    }

    async fn get_all_environments(&self) -> StorageResult<Vec<Environment>> {
        route!(self, get_all_environments())
    }

    async fn delete_environment(&self, id: &str) -> StorageResult<()> {
        route!(self, delete_environment(id))
    }

    async fn save_request(&self, request: Request) -> StorageResult<Request> {
        route!(self, save_request(request.clone()))
    }

    async fn get_request(&self, id: &str) -> StorageResult<Request> {
        route!(self, get_request(id))
    }

    async fn get_requests_by_collection(
        &self,
        collection_id: &str,
    ) -> StorageResult<Vec<Request>> {
        route!(self, get_requests_by_collection(collection_id))
    }

    async fn get_all_requests(&self) -> StorageResult<Vec<Request>> {
        route!(self, get_all_requests())
    }

    async fn delete_request(&self, id: &str) -> StorageResult<()> {
        route!(self, delete_request(id))
    }

    async fn save_history(&self, entry: HistoryEntry) -> StorageResult<HistoryEntry> {
        route!(self, save_history(entry.clone()))
    }

    async fn get_history_by_room(
        &self,
        room_id: &str,
        limit: Option<i64>,
    ) -> StorageResult<Vec<HistoryEntry>> {
        route!(self, get_history_by_room(room_id, limit))
    }

    async fn get_all_history(&self, limit: Option<i64>) -> StorageResult<Vec<HistoryEntry>> {
        route!(self, get_all_history(limit))
    }

    async fn delete_history(&self, id: &str) -> StorageResult<()> {
        route!(self, delete_history(id))
    }

    async fn save_room(&self, record: RoomRecord) -> StorageResult<RoomRecord> {
        route!(self, save_room(record.clone()))
    }

    async fn get_room(&self, room_id: &str) -> StorageResult<RoomRecord> {
        route!(self, get_room(room_id))
    }

    async fn get_room_devices(&self, room_id: &str) -> StorageResult<Vec<Device>> {
        route!(self, get_room_devices(room_id))
    }

    async fn admit_device(&self, admission: DeviceAdmission) -> StorageResult<Admission> {
        route!(self, admit_device(admission.clone()))
    }

    async fn remove_device(&self, room_id: &str, device_id: &str) -> StorageResult<()> {
        route!(self, remove_device(room_id, device_id))
    }

    async fn delete_room(&self, room_id: &str) -> StorageResult<()> {
        route!(self, delete_room(room_id))
    }

    async fn apply_sync_batch(&self, batch: SyncBatch) -> StorageResult<SyncBatch> {
        route!(self, apply_sync_batch(batch.clone()))
    }

    /// Reports the primary only.
    async fn ping(&self) -> StorageResult<()> {
        self.primary.ping().await
    }

    /// Closes both backends, reporting every failure.
    async fn close(&self) -> StorageResult<()> {
        let mut failures = Vec::new();
        if let Err(err) = self.primary.close().await {
            failures.push(format!("{}: {}", self.primary.kind(), err));
        }
        if let Some(fallback) = &self.fallback {
            if let Err(err) = fallback.close().await {
                failures.push(format!("{}: {}", fallback.kind(), err));
            }
        }

        if failures.is_empty() {
            info!("Storage closed");
            Ok(())
        } else {
            Err(StorageError::Close(failures.join("; ")))
        }
    }
}
