use crate::app_state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use resterx_storage::Backend;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub primary: String,
    pub fallback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reports the primary backend only; a healthy fallback does not make the
/// service healthy.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let primary = state.storage.primary_kind().to_string();
    let fallback = state.storage.fallback_kind().map(|kind| kind.to_string());

    match state.storage.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                primary,
                fallback,
                error: None,
            }),
        ),
        Err(e) => {
            warn!("Health check failed on {}: {}", primary, e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    primary,
                    fallback,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}
