// --- File: crates/services/resterx_backend/src/app_state.rs ---
use resterx_config::AppConfig;
use resterx_rooms::{JwtTokenService, RoomError, RoomService, SyncCoordinator};
use resterx_storage::{Backend, StorageManager};
use std::sync::Arc;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<StorageManager>,
    pub rooms: Arc<RoomService>,
    pub sync: Arc<SyncCoordinator>,
}

/// Wires the room services on top of an initialised storage manager.
pub struct AppStateBuilder {
    config: Arc<AppConfig>,
    storage: Arc<StorageManager>,
    password_cost: Option<u32>,
}

impl AppStateBuilder {
    pub fn new(config: Arc<AppConfig>, storage: Arc<StorageManager>) -> Self {
        Self {
            config,
            storage,
            password_cost: None,
        }
    }

    /// bcrypt cost for room passwords; the library default applies when unset.
    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = Some(cost);
        self
    }

    /// Fails when no room token secret is configured.
    pub fn build(self) -> Result<AppState, RoomError> {
        let backend: Arc<dyn Backend> = self.storage.clone();
        let tokens = Arc::new(JwtTokenService::from_config(&self.config.auth)?);

        let mut rooms = RoomService::new(backend.clone(), tokens);
        if let Some(cost) = self.password_cost {
            rooms = rooms.with_password_cost(cost);
        }

        Ok(AppState {
            config: self.config,
            storage: self.storage,
            rooms: Arc::new(rooms),
            sync: Arc::new(SyncCoordinator::new(backend)),
        })
    }
}

impl AppState {
    pub fn builder(config: Arc<AppConfig>, storage: Arc<StorageManager>) -> AppStateBuilder {
        AppStateBuilder::new(config, storage)
    }

    pub fn new(config: Arc<AppConfig>, storage: Arc<StorageManager>) -> Result<Self, RoomError> {
        Self::builder(config, storage).build()
    }
}
