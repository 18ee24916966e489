//! Room sync endpoints. Both require a bearer token issued for the room in
//! the path.

use crate::app_state::AppState;
use crate::handlers::auth::authorize_room;
use axum::{
    extract::{Path, State},
    Json,
};
use http::HeaderMap;
use resterx_common::ResterxError;
use resterx_rooms::RoomData;
use resterx_storage::SyncBatch;

pub async fn pull_room_data(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RoomData>, ResterxError> {
    authorize_room(&state, &headers, &room_id).await?;
    Ok(Json(state.sync.get_room_data(&room_id).await?))
}

pub async fn push_room_data(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Json(batch): Json<SyncBatch>,
) -> Result<Json<SyncBatch>, ResterxError> {
    authorize_room(&state, &headers, &room_id).await?;
    Ok(Json(state.sync.sync_room_data(&room_id, batch).await?))
}
