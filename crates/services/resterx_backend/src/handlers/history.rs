use crate::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use resterx_common::ResterxError;
use resterx_storage::{Backend, HistoryEntry};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub room_id: Option<String>,
    pub limit: Option<i64>,
}

/// Newest first; `limit` defaults to the storage default when absent.
pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, ResterxError> {
    let entries = match query.room_id.as_deref() {
        Some(room_id) => state.storage.get_history_by_room(room_id, query.limit).await?,
        None => state.storage.get_all_history(query.limit).await?,
    };
    Ok(Json(entries))
}

pub async fn create_history(
    State(state): State<AppState>,
    Json(entry): Json<HistoryEntry>,
) -> Result<(StatusCode, Json<HistoryEntry>), ResterxError> {
    let saved = state.storage.save_history(entry).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn delete_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ResterxError> {
    state.storage.delete_history(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
