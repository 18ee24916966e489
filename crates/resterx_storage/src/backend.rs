//! The capability interface every storage technology implements.

use crate::error::{StorageError, StorageResult};
use crate::model::{
    Admission, Collection, Device, DeviceAdmission, Environment, HistoryEntry, Request,
    RoomRecord, SyncBatch,
};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

/// Which storage technology a backend speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// MongoDB document store
    Document,
    /// Embedded SQLite file
    Relational,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Document => "mongodb",
            BackendKind::Relational => "sqlite",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform persistence contract.
///
/// * `save_*` is an upsert: no id means insert under a freshly minted id,
///   an id means full replace. Timestamps are always assigned here.
/// * `get_*` of a missing id is [`StorageError::NotFound`].
/// * `delete_*` of a missing id succeeds.
/// * History lists are newest-first and default to
///   [`DEFAULT_HISTORY_LIMIT`](crate::model::DEFAULT_HISTORY_LIMIT) entries.
/// * Every call is bounded by the backend's operation timeout; expiry is
///   reported as [`StorageError::Connection`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    // Collections
    async fn save_collection(&self, collection: Collection) -> StorageResult<Collection>;
    async fn get_collection(&self, id: &str) -> StorageResult<Collection>;
    async fn get_collections_by_room(&self, room_id: &str) -> StorageResult<Vec<Collection>>;
    async fn get_all_collections(&self) -> StorageResult<Vec<Collection>>;
    async fn delete_collection(&self, id: &str) -> StorageResult<()>;

    // Environments
    async fn save_environment(&self, environment: Environment) -> StorageResult<Environment>;
    async fn get_environment(&self, id: &str) -> StorageResult<Environment>;
    async fn get_environments_by_room(&self, room_id: &str) -> StorageResult<Vec<Environment>>;
    async fn get_all_environments(&self) -> StorageResult<Vec<Environment>>;
    async fn delete_environment(&self, id: &str) -> StorageResult<()>;

    // Requests
    async fn save_request(&self, request: Request) -> StorageResult<Request>;
    async fn get_request(&self, id: &str) -> StorageResult<Request>;
    async fn get_requests_by_collection(&self, collection_id: &str)
        -> StorageResult<Vec<Request>>;
    async fn get_all_requests(&self) -> StorageResult<Vec<Request>>;
    async fn delete_request(&self, id: &str) -> StorageResult<()>;

    // History
    /// Inserts an entry. Saving an id that already exists is rejected.
    async fn save_history(&self, entry: HistoryEntry) -> StorageResult<HistoryEntry>;
    async fn get_history_by_room(
        &self,
        room_id: &str,
        limit: Option<i64>,
    ) -> StorageResult<Vec<HistoryEntry>>;
    async fn get_all_history(&self, limit: Option<i64>) -> StorageResult<Vec<HistoryEntry>>;
    async fn delete_history(&self, id: &str) -> StorageResult<()>;

    // Rooms and devices
    /// Upserts a room. A room without a numeric id is inserted and given one;
    /// its public `room_id` must not already exist.
    async fn save_room(&self, record: RoomRecord) -> StorageResult<RoomRecord>;
    /// Looks a room up by its public id.
    async fn get_room(&self, room_id: &str) -> StorageResult<RoomRecord>;
    /// Devices of a room, most recently active first.
    async fn get_room_devices(&self, room_id: &str) -> StorageResult<Vec<Device>>;
    /// Refreshes a registered device, or registers a new one if the room is
    /// below its limit. The count check and the insert are one atomic step.
    async fn admit_device(&self, admission: DeviceAdmission) -> StorageResult<Admission>;
    async fn remove_device(&self, room_id: &str, device_id: &str) -> StorageResult<()>;
    /// Deletes a room with its devices, collections, environments and the
    /// requests of those collections, all or nothing.
    async fn delete_room(&self, room_id: &str) -> StorageResult<()>;

    /// Upserts every entity of the batch in one transaction and returns them
    /// as stored.
    async fn apply_sync_batch(&self, batch: SyncBatch) -> StorageResult<SyncBatch>;

    async fn ping(&self) -> StorageResult<()>;
    async fn close(&self) -> StorageResult<()>;
}

/// Runs a store call under `limit`, mapping expiry to a connection error.
pub async fn with_timeout<T, F>(limit: Duration, operation: &str, call: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Connection(format!(
            "{} timed out after {}ms",
            operation,
            limit.as_millis()
        ))),
    }
}
