//! HTTP surface of resterx: storage CRUD, request history, rooms and room
//! sync, all served by axum on top of a [`resterx_storage::StorageManager`].

pub mod app_state;
pub mod handlers;
pub mod routes;

pub use app_state::{AppState, AppStateBuilder};
pub use routes::build_router;
