//! Embedded relational backend on a single SQLite file.
//!
//! One table per entity kind. Map-valued fields are stored as JSON text and
//! timestamps as epoch milliseconds (see [`codec`]).

pub mod codec;
mod rows;

use crate::backend::{with_timeout, Backend, BackendKind};
use crate::error::{StorageError, StorageResult};
use crate::model::{
    effective_history_limit, now_millis, Admission, Collection, Device, DeviceAdmission,
    Environment, HistoryEntry, Request, RoomRecord, SyncBatch,
};
use async_trait::async_trait;
use rows::*;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS storage_collections (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        room_id TEXT,
        workspace_id TEXT,
        requests TEXT NOT NULL DEFAULT '',
        metadata TEXT NOT NULL DEFAULT '',
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        CHECK (room_id IS NULL OR workspace_id IS NULL)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_storage_collections_room ON storage_collections(room_id)",
    r#"
    CREATE TABLE IF NOT EXISTS storage_environments (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        variables TEXT NOT NULL DEFAULT '',
        room_id TEXT,
        workspace_id TEXT,
        is_active INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        CHECK (room_id IS NULL OR workspace_id IS NULL)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_storage_environments_room ON storage_environments(room_id)",
    r#"
    CREATE TABLE IF NOT EXISTS storage_requests (
        id TEXT PRIMARY KEY,
        collection_id TEXT NOT NULL,
        name TEXT NOT NULL,
        method TEXT NOT NULL,
        url TEXT NOT NULL,
        headers TEXT NOT NULL DEFAULT '',
        body TEXT NOT NULL DEFAULT '',
        query_params TEXT NOT NULL DEFAULT '',
        auth_type TEXT NOT NULL DEFAULT '',
        auth_data TEXT NOT NULL DEFAULT '',
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_storage_requests_collection ON storage_requests(collection_id)",
    r#"
    CREATE TABLE IF NOT EXISTS storage_history (
        id TEXT PRIMARY KEY,
        room_id TEXT,
        method TEXT NOT NULL,
        url TEXT NOT NULL,
        status_code INTEGER NOT NULL DEFAULT 0,
        response_time INTEGER NOT NULL DEFAULT 0,
        headers TEXT NOT NULL DEFAULT '',
        response TEXT NOT NULL DEFAULT '',
        timestamp INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_storage_history_room ON storage_history(room_id, timestamp)",
    r#"
    CREATE TABLE IF NOT EXISTS rooms (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        room_id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        room_type TEXT NOT NULL DEFAULT 'free',
        device_limit INTEGER NOT NULL DEFAULT 3,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS room_devices (
        id TEXT PRIMARY KEY,
        room_id TEXT NOT NULL REFERENCES rooms(room_id),
        device_id TEXT NOT NULL,
        device_name TEXT NOT NULL,
        last_active INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE (room_id, device_id)
    )
    "#,
];

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_) => StorageError::Connection(err.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::Validation(format!("duplicate identifier: {}", db.message()))
            }
            sqlx::Error::Database(db) if db.is_check_violation() => {
                StorageError::Validation(db.message().to_string())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                StorageError::Validation(format!("referenced record missing: {}", db.message()))
            }
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::ColumnNotFound(_) => StorageError::Serialization(err.to_string()),
            _ => StorageError::Query(err.to_string()),
        }
    }
}

/// SQLite implementation of [`Backend`]
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    op_timeout: Duration,
}

impl SqliteBackend {
    /// Opens (creating if needed) the database file at `path` and ensures the
    /// schema exists.
    ///
    /// # Arguments
    ///
    /// * `path` - File path, or `:memory:` for a private in-memory database
    /// * `op_timeout` - Upper bound for every store call
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the file cannot be created or
    /// opened.
    pub async fn connect(path: &str, op_timeout: Duration) -> StorageResult<Self> {
        if path == ":memory:" || path == "sqlite::memory:" {
            return Self::in_memory(op_timeout).await;
        }

        debug!("Opening SQLite storage at {}", path);
        if let Some(dir) = Path::new(path).parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    error!("Failed to create directory for SQLite storage: {}", e);
                    StorageError::Connection(format!("failed to create {}: {}", dir.display(), e))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(op_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(op_timeout)
            .idle_timeout(Duration::from_secs(600))
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("Failed to open SQLite storage: {}", e);
                StorageError::Connection(e.to_string())
            })?;

        let backend = Self { pool, op_timeout };
        backend.init_schema().await?;
        info!("SQLite storage ready at {}", path);
        Ok(backend)
    }

    /// A private in-memory database on a single connection that never expires.
    pub async fn in_memory(op_timeout: Duration) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(op_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let backend = Self { pool, op_timeout };
        backend.init_schema().await?;
        Ok(backend)
    }

    async fn init_schema(&self) -> StorageResult<()> {
        debug!("Initializing SQLite storage schema");
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_all_mapped<T>(
        &self,
        sql: String,
        binds: &[&str],
        map: fn(&sqlx::sqlite::SqliteRow) -> StorageResult<T>,
    ) -> StorageResult<Vec<T>> {
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(*value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(map).collect()
    }

    async fn fetch_one_mapped<T>(
        &self,
        table: &str,
        columns: &str,
        entity: &'static str,
        id: &str,
        map: fn(&sqlx::sqlite::SqliteRow) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?", columns, table);
        match sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await? {
            Some(row) => map(&row),
            None => Err(StorageError::not_found(entity, id)),
        }
    }

    async fn delete_by_id(&self, table: &str, id: &str) -> StorageResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", table);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        debug!("Deleted {} row(s) from {}", result.rows_affected(), table);
        Ok(())
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    async fn save_collection(&self, collection: Collection) -> StorageResult<Collection> {
        debug!("Saving collection {:?}", collection.id);
        with_timeout(self.op_timeout, "save_collection", async {
            let mut conn = self.pool.acquire().await?;
            upsert_collection(&mut conn, collection).await
        })
        .await
    }

    async fn get_collection(&self, id: &str) -> StorageResult<Collection> {
        with_timeout(
            self.op_timeout,
            "get_collection",
            self.fetch_one_mapped(
                "storage_collections",
                COLLECTION_COLUMNS,
                "collection",
                id,
                collection_from_row,
            ),
        )
        .await
    }

    async fn get_collections_by_room(&self, room_id: &str) -> StorageResult<Vec<Collection>> {
        let sql = format!(
            "SELECT {} FROM storage_collections WHERE room_id = ? ORDER BY created_at, rowid",
            COLLECTION_COLUMNS
        );
        with_timeout(
            self.op_timeout,
            "get_collections_by_room",
            self.fetch_all_mapped(sql, &[room_id], collection_from_row),
        )
        .await
    }

    async fn get_all_collections(&self) -> StorageResult<Vec<Collection>> {
        let sql = format!(
            "SELECT {} FROM storage_collections ORDER BY created_at, rowid",
            COLLECTION_COLUMNS
        );
        with_timeout(
            self.op_timeout,
            "get_all_collections",
            self.fetch_all_mapped(sql, &[], collection_from_row),
        )
        .await
    }

    async fn delete_collection(&self, id: &str) -> StorageResult<()> {
        with_timeout(
            self.op_timeout,
            "delete_collection",
            self.delete_by_id("storage_collections", id),
        )
        .await
    }

    async fn save_environment(&self, environment: Environment) -> StorageResult<Environment> {
        debug!("Saving environment {:?}", environment.id);
        with_timeout(self.op_timeout, "save_environment", async {
            let mut conn = self.pool.acquire().await?;
            upsert_environment(&mut conn, environment).await
        })
        .await
    }

    async fn get_environment(&self, id: &str) -> StorageResult<Environment> {
        with_timeout(
            self.op_timeout,
            "get_environment",
            self.fetch_one_mapped(
                "storage_environments",
                ENVIRONMENT_COLUMNS,
                "environment",
                id,
                environment_from_row,
            ),
        )
        .await
    }

    async fn get_environments_by_room(&self, room_id: &str) -> StorageResult<Vec<Environment>> {
        let sql = format!(
            "SELECT {} FROM storage_environments WHERE room_id = ? ORDER BY created_at, rowid",
            ENVIRONMENT_COLUMNS
        );
        with_timeout(
            self.op_timeout,
            "get_environments_by_room",
            self.fetch_all_mapped(sql, &[room_id], environment_from_row),
        )
        .await
    }

    async fn get_all_environments(&self) -> StorageResult<Vec<Environment>> {
        let sql = format!(
            "SELECT {} FROM storage_environments ORDER BY created_at, rowid",
            ENVIRONMENT_COLUMNS
        );
        with_timeout(
            self.op_timeout,
            "get_all_environments",
            self.fetch_all_mapped(sql, &[], environment_from_row),
        )
        .await
    }

    async fn delete_environment(&self, id: &str) -> StorageResult<()> {
        with_timeout(
            self.op_timeout,
            "delete_environment",
            self.delete_by_id("storage_environments", id),
        )
        .await
    }

    async fn save_request(&self, request: Request) -> StorageResult<Request> {
        debug!("Saving request {:?}", request.id);
        with_timeout(self.op_timeout, "save_request", async {
            let mut conn = self.pool.acquire().await?;
            upsert_request(&mut conn, request).await
        })
        .await
    }

    async fn get_request(&self, id: &str) -> StorageResult<Request> {
        with_timeout(
            self.op_timeout,
            "get_request",
            self.fetch_one_mapped(
                "storage_requests",
                REQUEST_COLUMNS,
                "request",
                id,
                request_from_row,
            ),
        )
        .await
    }

    async fn get_requests_by_collection(
        &self,
        collection_id: &str,
    ) -> StorageResult<Vec<Request>> {
        let sql = format!(
            "SELECT {} FROM storage_requests WHERE collection_id = ? ORDER BY created_at, rowid",
            REQUEST_COLUMNS
        );
        with_timeout(
            self.op_timeout,
            "get_requests_by_collection",
            self.fetch_all_mapped(sql, &[collection_id], request_from_row),
        )
        .await
    }

    async fn get_all_requests(&self) -> StorageResult<Vec<Request>> {
        let sql = format!(
            "SELECT {} FROM storage_requests ORDER BY created_at, rowid",
            REQUEST_COLUMNS
        );
        with_timeout(
            self.op_timeout,
            "get_all_requests",
            self.fetch_all_mapped(sql, &[], request_from_row),
        )
        .await
    }

    async fn delete_request(&self, id: &str) -> StorageResult<()> {
        with_timeout(
            self.op_timeout,
            "delete_request",
            self.delete_by_id("storage_requests", id),
        )
        .await
    }

    async fn save_history(&self, entry: HistoryEntry) -> StorageResult<HistoryEntry> {
        with_timeout(self.op_timeout, "save_history", async {
            let mut conn = self.pool.acquire().await?;
            insert_history(&mut conn, entry).await
        })
        .await
    }

    async fn get_history_by_room(
        &self,
        room_id: &str,
        limit: Option<i64>,
    ) -> StorageResult<Vec<HistoryEntry>> {
        let sql = format!(
            "SELECT {} FROM storage_history WHERE room_id = ? \
             ORDER BY timestamp DESC, rowid DESC LIMIT {}",
            HISTORY_COLUMNS,
            effective_history_limit(limit)
        );
        with_timeout(
            self.op_timeout,
            "get_history_by_room",
            self.fetch_all_mapped(sql, &[room_id], history_from_row),
        )
        .await
    }

    async fn get_all_history(&self, limit: Option<i64>) -> StorageResult<Vec<HistoryEntry>> {
        let sql = format!(
            "SELECT {} FROM storage_history ORDER BY timestamp DESC, rowid DESC LIMIT {}",
            HISTORY_COLUMNS,
            effective_history_limit(limit)
        );
        with_timeout(
            self.op_timeout,
            "get_all_history",
            self.fetch_all_mapped(sql, &[], history_from_row),
        )
        .await
    }

    async fn delete_history(&self, id: &str) -> StorageResult<()> {
        with_timeout(
            self.op_timeout,
            "delete_history",
            self.delete_by_id("storage_history", id),
        )
        .await
    }

    async fn save_room(&self, record: RoomRecord) -> StorageResult<RoomRecord> {
        debug!("Saving room {}", record.room.room_id);
        with_timeout(self.op_timeout, "save_room", async {
            let mut conn = self.pool.acquire().await?;
            upsert_room(&mut conn, record).await
        })
        .await
    }

    async fn get_room(&self, room_id: &str) -> StorageResult<RoomRecord> {
        with_timeout(self.op_timeout, "get_room", async {
            let sql = format!("SELECT {} FROM rooms WHERE room_id = ?", ROOM_COLUMNS);
            match sqlx::query(&sql)
                .bind(room_id)
                .fetch_optional(&self.pool)
                .await?
            {
                Some(row) => room_from_row(&row),
                None => Err(StorageError::not_found("room", room_id)),
            }
        })
        .await
    }

    async fn get_room_devices(&self, room_id: &str) -> StorageResult<Vec<Device>> {
        let sql = format!(
            "SELECT {} FROM room_devices WHERE room_id = ? \
             ORDER BY last_active DESC, created_at DESC",
            DEVICE_COLUMNS
        );
        with_timeout(
            self.op_timeout,
            "get_room_devices",
            self.fetch_all_mapped(sql, &[room_id], device_from_row),
        )
        .await
    }

    async fn admit_device(&self, admission: DeviceAdmission) -> StorageResult<Admission> {
        debug!(
            "Admitting device {} into room {}",
            admission.device_id, admission.room_id
        );
        with_timeout(self.op_timeout, "admit_device", async {
            let now = codec::to_millis(&now_millis());
            let mut tx = self.pool.begin().await?;

            // The first write takes the database write lock, so the count
            // below cannot change until commit.
            let refreshed = sqlx::query(
                "UPDATE room_devices SET last_active = ?, device_name = COALESCE(?, device_name) \
                 WHERE room_id = ? AND device_id = ?",
            )
            .bind(now)
            .bind(admission.device_name.as_deref())
            .bind(&admission.room_id)
            .bind(&admission.device_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            let newly_registered = if refreshed == 0 {
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO room_devices
                        (id, room_id, device_id, device_name, last_active, created_at)
                    SELECT ?, ?, ?, ?, ?, ?
                    WHERE (SELECT COUNT(*) FROM room_devices WHERE room_id = ?) < ?
                    "#,
                )
                .bind(new_id())
                .bind(&admission.room_id)
                .bind(&admission.device_id)
                .bind(admission.name_for_insert())
                .bind(now)
                .bind(now)
                .bind(&admission.room_id)
                .bind(i64::from(admission.device_limit))
                .execute(&mut *tx)
                .await?
                .rows_affected();

                if inserted == 0 {
                    return Err(StorageError::CapacityExceeded {
                        room_id: admission.room_id.clone(),
                        limit: admission.device_limit,
                    });
                }
                true
            } else {
                false
            };

            let sql = format!(
                "SELECT {} FROM room_devices WHERE room_id = ? AND device_id = ?",
                DEVICE_COLUMNS
            );
            let row = sqlx::query(&sql)
                .bind(&admission.room_id)
                .bind(&admission.device_id)
                .fetch_one(&mut *tx)
                .await?;
            let device = device_from_row(&row)?;
            tx.commit().await?;

            Ok(Admission {
                device,
                newly_registered,
            })
        })
        .await
    }

    async fn remove_device(&self, room_id: &str, device_id: &str) -> StorageResult<()> {
        with_timeout(self.op_timeout, "remove_device", async {
            sqlx::query("DELETE FROM room_devices WHERE room_id = ? AND device_id = ?")
                .bind(room_id)
                .bind(device_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn delete_room(&self, room_id: &str) -> StorageResult<()> {
        info!("Deleting room {} and its contents", room_id);
        with_timeout(self.op_timeout, "delete_room", async {
            let mut tx = self.pool.begin().await?;
            let statements = [
                "DELETE FROM room_devices WHERE room_id = ?",
                "DELETE FROM storage_requests WHERE collection_id IN \
                 (SELECT id FROM storage_collections WHERE room_id = ?)",
                "DELETE FROM storage_collections WHERE room_id = ?",
                "DELETE FROM storage_environments WHERE room_id = ?",
            ];
            for statement in statements {
                sqlx::query(statement)
                    .bind(room_id)
                    .execute(&mut *tx)
                    .await?;
            }
            let deleted = sqlx::query("DELETE FROM rooms WHERE room_id = ?")
                .bind(room_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            // Dropping `tx` rolls the cascade back.
            if deleted == 0 {
                return Err(StorageError::not_found("room", room_id));
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn apply_sync_batch(&self, batch: SyncBatch) -> StorageResult<SyncBatch> {
        debug!("Applying sync batch of {} entities", batch.len());
        with_timeout(self.op_timeout, "apply_sync_batch", async {
            let mut tx = self.pool.begin().await?;
            let mut stored = SyncBatch::default();

            // Any error returns early and drops `tx`, which rolls back.
            for collection in batch.collections {
                stored
                    .collections
                    .push(upsert_collection(&mut tx, collection).await?);
            }
            for environment in batch.environments {
                stored
                    .environments
                    .push(upsert_environment(&mut tx, environment).await?);
            }
            for request in batch.requests {
                stored.requests.push(upsert_request(&mut tx, request).await?);
            }

            tx.commit().await?;
            Ok(stored)
        })
        .await
    }

    async fn ping(&self) -> StorageResult<()> {
        with_timeout(self.op_timeout, "ping", async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> StorageResult<()> {
        self.pool.close().await;
        info!("SQLite storage closed");
        Ok(())
    }
}
