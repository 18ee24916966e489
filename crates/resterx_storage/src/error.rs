//! Error types for the storage layer

use resterx_common::ResterxError;
use thiserror::Error;

/// Result alias used by every storage operation
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur when working with a storage backend
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    /// The backend is unreachable or the call timed out
    #[error("Storage connection error: {0}")]
    Connection(String),

    /// No record exists for the identifier
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The record was rejected before it was written
    #[error("Validation error: {0}")]
    Validation(String),

    /// A room has reached its device limit
    #[error("Room {room_id} has reached its device limit of {limit}")]
    CapacityExceeded { room_id: String, limit: u32 },

    /// The backend accepted the connection but the statement failed
    #[error("Storage query error: {0}")]
    Query(String),

    /// A stored value could not be encoded or decoded
    #[error("Storage serialization error: {0}")]
    Serialization(String),

    /// One or more backends failed to shut down
    #[error("Failed to close storage: {0}")]
    Close(String),
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StorageError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether the storage manager should retry this call on the fallback.
    ///
    /// Caller-caused failures (validation, capacity) would fail the same way
    /// on any backend and are returned as-is.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            StorageError::Connection(_)
                | StorageError::NotFound { .. }
                | StorageError::Query(_)
                | StorageError::Serialization(_)
        )
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<StorageError> for ResterxError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Connection(msg) => ResterxError::ConnectionError(msg),
            e @ StorageError::NotFound { .. } => ResterxError::NotFoundError(e.to_string()),
            StorageError::Validation(msg) => ResterxError::ValidationError(msg),
            e @ StorageError::CapacityExceeded { .. } => {
                ResterxError::CapacityExceeded(e.to_string())
            }
            StorageError::Serialization(msg) => ResterxError::ParseError(msg),
            StorageError::Query(msg) | StorageError::Close(msg) => {
                ResterxError::InternalError(msg)
            }
        }
    }
}
