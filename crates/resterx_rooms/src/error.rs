// --- File: crates/resterx_rooms/src/error.rs ---
use resterx_common::{HttpStatusCode, ResterxError};
use resterx_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RoomError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Room {room_id} has reached its device limit of {limit}")]
    CapacityExceeded { room_id: String, limit: u32 },

    /// Bad token, wrong role, bad password or inactive room
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error(transparent)]
    Storage(StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

// Storage kinds that callers can act on keep their meaning; the rest stay
// wrapped as storage failures.
impl From<StorageError> for RoomError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => {
                RoomError::NotFound(format!("{} {}", entity, id))
            }
            StorageError::CapacityExceeded { room_id, limit } => {
                RoomError::CapacityExceeded { room_id, limit }
            }
            StorageError::Validation(msg) => RoomError::Validation(msg),
            other => RoomError::Storage(other),
        }
    }
}

impl HttpStatusCode for RoomError {
    fn status_code(&self) -> u16 {
        match self {
            RoomError::Validation(_) => 400,
            RoomError::NotFound(_) => 404,
            RoomError::CapacityExceeded { .. } => 409,
            RoomError::Auth(_) => 401,
            RoomError::Storage(e) => ResterxError::from(e.clone()).status_code(),
            RoomError::Internal(_) => 500,
        }
    }
}

impl From<RoomError> for ResterxError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::Validation(msg) => ResterxError::ValidationError(msg),
            RoomError::NotFound(msg) => ResterxError::NotFoundError(msg),
            e @ RoomError::CapacityExceeded { .. } => ResterxError::CapacityExceeded(e.to_string()),
            RoomError::Auth(msg) => ResterxError::AuthError(msg),
            RoomError::Storage(e) => e.into(),
            RoomError::Internal(msg) => ResterxError::InternalError(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_are_lifted() {
        let err: RoomError = StorageError::not_found("room", "abc123").into();
        assert_eq!(err, RoomError::NotFound("room abc123".into()));

        let err: RoomError = StorageError::CapacityExceeded {
            room_id: "abc123".into(),
            limit: 3,
        }
        .into();
        assert_eq!(err.status_code(), 409);

        let err: RoomError = StorageError::Connection("timed out".into()).into();
        assert!(matches!(err, RoomError::Storage(StorageError::Connection(_))));
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_auth_maps_to_unauthorized() {
        assert_eq!(RoomError::Auth("bad token".into()).status_code(), 401);
    }
}
