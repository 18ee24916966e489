//! Bearer room-token checks shared by the room-scoped routes.

use crate::app_state::AppState;
use http::{header::AUTHORIZATION, HeaderMap};
use resterx_common::{auth_error, ResterxError};
use resterx_storage::Room;
use tracing::warn;

fn bearer_token(headers: &HeaderMap) -> Result<&str, ResterxError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| auth_error("missing bearer token"))
}

/// Resolves the bearer token and requires it to grant `room_id`.
pub async fn authorize_room(
    state: &AppState,
    headers: &HeaderMap,
    room_id: &str,
) -> Result<Room, ResterxError> {
    let room = state.rooms.validate_room_token(bearer_token(headers)?).await?;
    if room.room_id != room_id {
        warn!(
            "Token for room {} used against room {}",
            room.room_id, room_id
        );
        return Err(auth_error("token does not grant access to this room"));
    }
    Ok(room)
}
