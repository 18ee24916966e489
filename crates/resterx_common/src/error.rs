// --- File: crates/resterx_common/src/error.rs ---
use std::fmt;
use thiserror::Error;

/// The base error type shared by all resterx crates.
///
/// Crate-specific errors (storage, rooms) convert into this type at the
/// HTTP boundary.
#[derive(Error, Debug)]
pub enum ResterxError {
    /// The backing store is unreachable or timed out
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Malformed input rejected before or during a store call
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// No record for the given identifier
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// A device or usage limit has been reached
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Invalid token, wrong role or bad room password
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// Failed to parse or encode data
    #[error("Failed to parse data: {0}")]
    ParseError(String),

    /// Anything else
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// A trait for converting errors to HTTP status codes.
pub trait HttpStatusCode {
    /// Returns the HTTP status code for this error.
    fn status_code(&self) -> u16;
}

impl HttpStatusCode for ResterxError {
    fn status_code(&self) -> u16 {
        match self {
            ResterxError::ConnectionError(_) => 503,
            ResterxError::ValidationError(_) => 400,
            ResterxError::NotFoundError(_) => 404,
            ResterxError::CapacityExceeded(_) => 409,
            ResterxError::AuthError(_) => 401,
            ResterxError::ParseError(_) => 400,
            ResterxError::InternalError(_) => 500,
        }
    }
}

impl From<serde_json::Error> for ResterxError {
    fn from(err: serde_json::Error) -> Self {
        ResterxError::ParseError(err.to_string())
    }
}

pub fn auth_error<T: fmt::Display>(message: T) -> ResterxError {
    ResterxError::AuthError(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_distinct_per_kind() {
        assert_eq!(
            ResterxError::NotFoundError("collection abc".into()).status_code(),
            404
        );
        assert_eq!(
            ResterxError::ValidationError("name is required".into()).status_code(),
            400
        );
        assert_eq!(
            ResterxError::CapacityExceeded("room full".into()).status_code(),
            409
        );
        assert_eq!(auth_error("bad token").status_code(), 401);
        assert_eq!(
            ResterxError::ConnectionError("timed out".into()).status_code(),
            503
        );
    }
}
