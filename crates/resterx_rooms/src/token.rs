//! Room tokens.
//!
//! The room service only needs two things from the auth side: issue a token
//! for a room, and decode one back into claims. [`JwtTokenService`] does
//! both with HS256 JWTs.

use crate::error::RoomError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use resterx_config::env_vars::SECRET_MARKER;
use resterx_config::AuthConfig;
use resterx_storage::Room;
use serde::{Deserialize, Serialize};

/// Role claim carried by every room token
pub const ROOM_ROLE: &str = "room";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomClaims {
    /// `room_<roomId>`
    pub sub: String,
    pub role: String,
    pub room_id: String,
    pub iat: i64,
    pub exp: i64,
}

#[cfg_attr(test, mockall::automock)]
pub trait RoomTokenService: Send + Sync {
    fn issue_room_token(&self, room: &Room) -> Result<String, RoomError>;

    /// Verifies the signature and expiry; fails with [`RoomError::Auth`].
    fn decode_token(&self, token: &str) -> Result<RoomClaims, RoomError>;
}

pub struct JwtTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl JwtTokenService {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Fails when the secret is empty or was never resolved from the
    /// environment.
    pub fn from_config(config: &AuthConfig) -> Result<Self, RoomError> {
        let secret = config.jwt_secret.trim();
        if secret.is_empty() || secret == SECRET_MARKER {
            return Err(RoomError::Internal(
                "room token secret is not configured".into(),
            ));
        }
        Ok(Self::new(&config.jwt_secret, config.token_ttl_secs))
    }
}

impl RoomTokenService for JwtTokenService {
    fn issue_room_token(&self, room: &Room) -> Result<String, RoomError> {
        let now = Utc::now();
        let claims = RoomClaims {
            sub: format!("room_{}", room.room_id),
            role: ROOM_ROLE.to_string(),
            room_id: room.room_id.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| RoomError::Internal(format!("failed to sign room token: {}", e)))
    }

    fn decode_token(&self, token: &str) -> Result<RoomClaims, RoomError> {
        decode::<RoomClaims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| RoomError::Auth(format!("invalid token: {}", e)))
    }
}
