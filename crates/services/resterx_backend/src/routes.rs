// --- File: crates/services/resterx_backend/src/routes.rs ---
use crate::app_state::AppState;
use crate::handlers::{health, history, rooms, storage, sync};
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

fn storage_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/collections",
            get(storage::list_collections).post(storage::create_collection),
        )
        .route(
            "/collections/{id}",
            get(storage::get_collection)
                .put(storage::update_collection)
                .delete(storage::delete_collection),
        )
        .route(
            "/environments",
            get(storage::list_environments).post(storage::create_environment),
        )
        .route(
            "/environments/{id}",
            get(storage::get_environment)
                .put(storage::update_environment)
                .delete(storage::delete_environment),
        )
        .route(
            "/requests",
            get(storage::list_requests).post(storage::create_request),
        )
        .route(
            "/requests/{id}",
            get(storage::get_request)
                .put(storage::update_request)
                .delete(storage::delete_request),
        )
        .route(
            "/history",
            get(history::list_history).post(history::create_history),
        )
        .route("/history/{id}", delete(history::delete_history))
}

fn room_routes() -> Router<AppState> {
    Router::new()
        .route("/join", post(rooms::join_room))
        .route(
            "/{room_id}",
            get(rooms::get_room).delete(rooms::delete_room),
        )
        .route("/{room_id}/devices", get(rooms::list_devices))
        .route(
            "/{room_id}/devices/{device_id}",
            delete(rooms::remove_device),
        )
        .route(
            "/{room_id}/sync",
            get(sync::pull_room_data).post(sync::push_room_data),
        )
}

/// Builds the full application router, everything nested under `/api`.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health::health))
        .route("/rooms", post(rooms::create_room))
        .nest("/storage", storage_routes())
        .nest("/rooms", room_routes());

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
