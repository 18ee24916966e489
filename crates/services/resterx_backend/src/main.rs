// File: services/resterx_backend/src/main.rs
use resterx_backend::{build_router, AppState};
use resterx_common::logging;
use resterx_config::load_config;
use resterx_storage::{Backend, StorageManager};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    let config = Arc::new(load_config().expect("Failed to load config"));
    logging::init_with_level(logging::parse_level(config.log_level.as_deref()));

    let storage = Arc::new(
        StorageManager::init(&config.storage)
            .await
            .expect("Failed to initialise storage"),
    );
    info!(
        "Storage ready: primary={}, fallback={}",
        storage.primary_kind(),
        storage
            .fallback_kind()
            .map(|kind| kind.to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    let state = AppState::new(config.clone(), storage.clone()).expect("Failed to build app state");
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind server address");
    info!("Starting server at http://{}", addr);
    info!("API endpoints available at http://{}/api", addr);

    if let Err(e) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    if let Err(e) = storage.close().await {
        error!("Failed to close storage cleanly: {}", e);
    }
}
