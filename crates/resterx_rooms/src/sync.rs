//! Pushes and pulls a room's entities in one piece.

use crate::error::RoomError;
use resterx_storage::{validate_id, Backend, Collection, Environment, Request, Scope, SyncBatch};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything a room owns, as handed to a device pulling state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomData {
    pub collections: Vec<Collection>,
    pub environments: Vec<Environment>,
    pub requests: Vec<Request>,
}

pub struct SyncCoordinator {
    storage: Arc<dyn Backend>,
}

impl SyncCoordinator {
    pub fn new(storage: Arc<dyn Backend>) -> Self {
        Self { storage }
    }

    /// Writes the batch into `room_id` as a single transaction.
    ///
    /// Collections and environments are re-scoped to the room, replacing any
    /// workspace scope they carried. Requests follow their collection.
    pub async fn sync_room_data(
        &self,
        room_id: &str,
        mut batch: SyncBatch,
    ) -> Result<SyncBatch, RoomError> {
        validate_id("room", room_id)?;
        self.storage.get_room(room_id).await?;

        for collection in &mut batch.collections {
            collection.scope = Some(Scope::room(room_id));
        }
        for environment in &mut batch.environments {
            environment.scope = Some(Scope::room(room_id));
        }

        if batch.is_empty() {
            debug!("Empty sync batch for room {}", room_id);
            return Ok(batch);
        }

        let count = batch.len();
        let applied = self.storage.apply_sync_batch(batch).await?;
        info!("Synced {} entities into room {}", count, room_id);
        Ok(applied)
    }

    pub async fn get_room_data(&self, room_id: &str) -> Result<RoomData, RoomError> {
        let collections = self.storage.get_collections_by_room(room_id).await?;
        let environments = self.storage.get_environments_by_room(room_id).await?;

        let mut requests = Vec::new();
        for collection in &collections {
            if let Some(id) = collection.id.as_deref() {
                requests.extend(self.storage.get_requests_by_collection(id).await?);
            }
        }

        debug!(
            "Room {}: {} collections, {} environments, {} requests",
            room_id,
            collections.len(),
            environments.len(),
            requests.len()
        );
        Ok(RoomData {
            collections,
            environments,
            requests,
        })
    }
}
