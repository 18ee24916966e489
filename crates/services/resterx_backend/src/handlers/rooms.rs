use crate::app_state::AppState;
use crate::handlers::auth::authorize_room;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use http::HeaderMap;
use resterx_common::ResterxError;
use resterx_rooms::{CreateRoomRequest, JoinRoomRequest, RoomSession};
use resterx_storage::{Device, Room};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct DeleteRoomBody {
    pub password: String,
}

pub async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomSession>), ResterxError> {
    let session = state.rooms.create_room(req).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn join_room(
    State(state): State<AppState>,
    Json(req): Json<JoinRoomRequest>,
) -> Result<Json<RoomSession>, ResterxError> {
    Ok(Json(state.rooms.join_room(req).await?))
}

pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Room>, ResterxError> {
    Ok(Json(state.rooms.get_room_by_room_id(&room_id).await?))
}

pub async fn delete_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<DeleteRoomBody>,
) -> Result<StatusCode, ResterxError> {
    state.rooms.delete_room(&room_id, &body.password).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Requires a token for the room.
pub async fn list_devices(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<Device>>, ResterxError> {
    authorize_room(&state, &headers, &room_id).await?;
    Ok(Json(state.rooms.get_room_devices(&room_id).await?))
}

pub async fn remove_device(
    State(state): State<AppState>,
    Path((room_id, device_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ResterxError> {
    authorize_room(&state, &headers, &room_id).await?;
    state.rooms.remove_device(&room_id, &device_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
