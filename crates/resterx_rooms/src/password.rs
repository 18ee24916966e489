//! Room password hashing.
//!
//! bcrypt is CPU-bound, so both directions run on the blocking pool.

use crate::error::RoomError;

/// Shortest password accepted for a new room
pub const MIN_PASSWORD_LEN: usize = 6;

pub async fn hash_password(password: String, cost: u32) -> Result<String, RoomError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| RoomError::Internal(format!("password hashing task failed: {}", e)))?
        .map_err(|e| RoomError::Internal(format!("failed to hash password: {}", e)))
}

/// Returns `Ok(false)` on mismatch; a malformed stored hash is an error.
pub async fn verify_password(password: String, hash: String) -> Result<bool, RoomError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| RoomError::Internal(format!("password check task failed: {}", e)))?
        .map_err(|e| RoomError::Internal(format!("failed to verify password: {}", e)))
}
