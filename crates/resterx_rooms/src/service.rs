// --- File: crates/resterx_rooms/src/service.rs ---
use crate::error::RoomError;
use crate::password::{hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::token::{RoomTokenService, ROOM_ROLE};
use resterx_storage::{
    Backend, Device, DeviceAdmission, Room, RoomRecord, RoomType, StorageError,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Device limit of a room created without one
pub const DEFAULT_DEVICE_LIMIT: u32 = 3;

const ROOM_ID_LEN: usize = 12;
const DEFAULT_NAME_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub room_type: Option<String>,
    #[serde(default)]
    pub device_limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub room_id: String,
    pub password: String,
    pub device_id: String,
    #[serde(default)]
    pub device_name: Option<String>,
}

/// A room handed back to a caller together with its bearer token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSession {
    pub room: Room,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    fn room_settings(self) -> (RoomType, u32) {
        match self {
            Plan::Free => (RoomType::Free, DEFAULT_DEVICE_LIMIT),
            Plan::Pro => (RoomType::Premium, 10),
            Plan::Enterprise => (RoomType::Premium, 50),
        }
    }
}

impl FromStr for Plan {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "pro" => Ok(Plan::Pro),
            "enterprise" => Ok(Plan::Enterprise),
            other => Err(RoomError::Validation(format!(
                "unsupported subscription plan: {:?}",
                other
            ))),
        }
    }
}

/// Event published when a room's subscription changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionUpgraded {
    pub room_id: String,
    pub plan: String,
}

pub fn generate_room_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(ROOM_ID_LEN);
    id
}

fn default_device_name(device_id: &str) -> String {
    let prefix: String = device_id.chars().take(DEFAULT_NAME_PREFIX_LEN).collect();
    format!("Device {}", prefix)
}

fn validate_new_room(req: &CreateRoomRequest) -> Result<(), RoomError> {
    if req.name.trim().is_empty() {
        return Err(RoomError::Validation("room name is required".into()));
    }
    if req.password.is_empty() {
        return Err(RoomError::Validation("room password is required".into()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(RoomError::Validation(format!(
            "room password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub struct RoomService {
    storage: Arc<dyn Backend>,
    tokens: Arc<dyn RoomTokenService>,
    password_cost: u32,
}

impl RoomService {
    pub fn new(storage: Arc<dyn Backend>, tokens: Arc<dyn RoomTokenService>) -> Self {
        Self {
            storage,
            tokens,
            password_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Overrides the bcrypt cost; low values are only meant for tests.
    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }

    pub async fn create_room(&self, req: CreateRoomRequest) -> Result<RoomSession, RoomError> {
        validate_new_room(&req)?;

        let room_type = match req.room_type.as_deref().map(str::trim) {
            None | Some("") => RoomType::Free,
            Some(raw) => RoomType::from_str(raw)?,
        };
        let device_limit = match req.device_limit {
            None | Some(0) => DEFAULT_DEVICE_LIMIT,
            Some(limit) => limit,
        };

        let password_hash = hash_password(req.password, self.password_cost).await?;
        let record = RoomRecord {
            room: Room {
                id: None,
                room_id: generate_room_id(),
                name: req.name.trim().to_string(),
                description: req.description,
                room_type,
                device_limit,
                is_active: true,
                created_at: None,
                updated_at: None,
            },
            password_hash,
        };

        let saved = self.storage.save_room(record).await?;
        let token = self.tokens.issue_room_token(&saved.room)?;
        info!(
            "Created room {} ({}, {} devices)",
            saved.room.room_id, saved.room.room_type, saved.room.device_limit
        );
        Ok(RoomSession {
            room: saved.room,
            token,
            device: None,
        })
    }

    pub async fn join_room(&self, req: JoinRoomRequest) -> Result<RoomSession, RoomError> {
        if req.device_id.trim().is_empty() {
            return Err(RoomError::Validation("device id is required".into()));
        }
        let record = self.storage.get_room(&req.room_id).await?;
        if !record.room.is_active {
            return Err(RoomError::Auth(format!("room {} is inactive", req.room_id)));
        }
        if !verify_password(req.password, record.password_hash).await? {
            warn!("Rejected join to room {}: wrong password", req.room_id);
            return Err(RoomError::Auth("invalid room password".into()));
        }

        let device_name = req
            .device_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        let admission = self
            .storage
            .admit_device(DeviceAdmission {
                room_id: record.room.room_id.clone(),
                default_name: default_device_name(&req.device_id),
                device_id: req.device_id,
                device_name,
                device_limit: record.room.device_limit,
            })
            .await?;

        if admission.newly_registered {
            info!(
                "Device {} joined room {}",
                admission.device.device_id, record.room.room_id
            );
        } else {
            debug!(
                "Device {} rejoined room {}",
                admission.device.device_id, record.room.room_id
            );
        }

        let token = self.tokens.issue_room_token(&record.room)?;
        Ok(RoomSession {
            room: record.room,
            token,
            device: Some(admission.device),
        })
    }

    pub async fn validate_room_token(&self, token: &str) -> Result<Room, RoomError> {
        let claims = self.tokens.decode_token(token)?;
        if claims.role != ROOM_ROLE {
            return Err(RoomError::Auth(format!(
                "token role {:?} is not a room token",
                claims.role
            )));
        }
        match self.storage.get_room(&claims.room_id).await {
            Ok(record) if !record.room.is_active => Err(RoomError::Auth(format!(
                "room {} is inactive",
                claims.room_id
            ))),
            Ok(record) => Ok(record.room),
            Err(StorageError::NotFound { .. }) => Err(RoomError::Auth(format!(
                "room {} no longer exists",
                claims.room_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_room_by_room_id(&self, room_id: &str) -> Result<Room, RoomError> {
        Ok(self.storage.get_room(room_id).await?.room)
    }

    pub async fn get_room_devices(&self, room_id: &str) -> Result<Vec<Device>, RoomError> {
        Ok(self.storage.get_room_devices(room_id).await?)
    }

    pub async fn remove_device(&self, room_id: &str, device_id: &str) -> Result<(), RoomError> {
        self.storage.remove_device(room_id, device_id).await?;
        debug!("Removed device {} from room {}", device_id, room_id);
        Ok(())
    }

    /// Deletes the room and everything it owns once the password checks out.
    pub async fn delete_room(&self, room_id: &str, password: &str) -> Result<(), RoomError> {
        let record = self.storage.get_room(room_id).await?;
        if !verify_password(password.to_string(), record.password_hash).await? {
            warn!("Rejected delete of room {}: wrong password", room_id);
            return Err(RoomError::Auth("invalid room password".into()));
        }
        self.storage.delete_room(room_id).await?;
        info!("Deleted room {}", room_id);
        Ok(())
    }

    pub async fn apply_subscription_upgrade(
        &self,
        event: SubscriptionUpgraded,
    ) -> Result<Room, RoomError> {
        let plan = Plan::from_str(&event.plan)?;
        let (room_type, device_limit) = plan.room_settings();

        let mut record = self.storage.get_room(&event.room_id).await?;
        record.room.room_type = room_type;
        record.room.device_limit = device_limit;
        let saved = self.storage.save_room(record).await?;
        info!(
            "Room {} moved to {:?} plan ({}, {} devices)",
            saved.room.room_id, plan, room_type, device_limit
        );
        Ok(saved.room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{MockRoomTokenService, RoomClaims};
    use resterx_storage::SqliteBackend;
    use std::time::Duration;

    async fn service_with(tokens: MockRoomTokenService) -> RoomService {
        let storage = SqliteBackend::in_memory(Duration::from_secs(5))
            .await
            .unwrap();
        RoomService::new(Arc::new(storage), Arc::new(tokens)).with_password_cost(4)
    }

    fn claims(role: &str, room_id: &str) -> RoomClaims {
        RoomClaims {
            sub: format!("room_{}", room_id),
            role: role.to_string(),
            room_id: room_id.to_string(),
            iat: 0,
            exp: i64::MAX,
        }
    }

    #[test]
    fn test_generated_room_ids_are_short_hex() {
        let id = generate_room_id();
        assert_eq!(id.len(), ROOM_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_room_id());
    }

    #[test]
    fn test_default_device_name_uses_prefix() {
        assert_eq!(default_device_name("abcdef123456"), "Device abcdef12");
        assert_eq!(default_device_name("abc"), "Device abc");
    }

    #[test]
    fn test_plan_parsing() {
        assert_eq!(Plan::from_str("PRO").unwrap(), Plan::Pro);
        assert_eq!(Plan::Enterprise.room_settings(), (RoomType::Premium, 50));
        assert!(matches!(
            Plan::from_str("platinum"),
            Err(RoomError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_non_room_role_is_rejected() {
        let mut tokens = MockRoomTokenService::new();
        tokens
            .expect_decode_token()
            .returning(|_| Ok(claims("user", "abc123")));
        let service = service_with(tokens).await;

        let err = service.validate_room_token("token").await.unwrap_err();
        assert!(matches!(err, RoomError::Auth(_)));
    }

    #[tokio::test]
    async fn test_token_for_missing_room_is_rejected() {
        let mut tokens = MockRoomTokenService::new();
        tokens
            .expect_decode_token()
            .returning(|_| Ok(claims(ROOM_ROLE, "gone00000000")));
        let service = service_with(tokens).await;

        let err = service.validate_room_token("token").await.unwrap_err();
        assert!(matches!(err, RoomError::Auth(_)));
    }

    #[tokio::test]
    async fn test_invalid_room_input_never_reaches_storage() {
        let mut tokens = MockRoomTokenService::new();
        tokens.expect_issue_room_token().never();
        let service = service_with(tokens).await;

        for (name, password) in [("", "secret1"), ("Team", ""), ("Team", "short")] {
            let err = service
                .create_room(CreateRoomRequest {
                    name: name.into(),
                    password: password.into(),
                    ..Default::default()
                })
                .await
                .unwrap_err();
            assert!(matches!(err, RoomError::Validation(_)), "{name:?}/{password:?}");
        }
    }
}
