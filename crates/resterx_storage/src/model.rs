//! Persisted entities and their wire shape.
//!
//! Every entity serializes to camelCase JSON. Map-valued fields are
//! `BTreeMap<String, Value>`, so keys are unique and ordering is irrelevant
//! to equality. Timestamps are assigned by the backends, never by callers,
//! and carry millisecond precision so both stores reproduce them exactly.

use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Free-form string-keyed map of JSON values (headers, variables, metadata)
pub type JsonMap = BTreeMap<String, serde_json::Value>;

/// Number of history entries returned when the caller gives no usable limit
pub const DEFAULT_HISTORY_LIMIT: i64 = 100;

/// Longest identifier a caller may supply
pub const MAX_ID_LEN: usize = 64;

/// Current time truncated to whole milliseconds.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    from_epoch_millis(now.timestamp_millis()).unwrap_or(now)
}

pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Non-positive or missing limits fall back to [`DEFAULT_HISTORY_LIMIT`].
pub fn effective_history_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(n) if n > 0 => n,
        _ => DEFAULT_HISTORY_LIMIT,
    }
}

/// Checks a caller-supplied identifier: 1 to 64 chars of `[A-Za-z0-9_-]`.
pub fn validate_id(entity: &str, id: &str) -> StorageResult<()> {
    let well_formed = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if well_formed {
        Ok(())
    } else {
        Err(StorageError::Validation(format!(
            "invalid {} identifier: {:?}",
            entity, id
        )))
    }
}

fn require(entity: &str, field: &str, value: &str) -> StorageResult<()> {
    if value.trim().is_empty() {
        return Err(StorageError::Validation(format!(
            "{} {} is required",
            entity, field
        )));
    }
    Ok(())
}

/// Owner of a collection or environment.
///
/// Flattened into the entity, so it appears on the wire as either a
/// `roomId` or a `workspaceId` field, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    #[serde(rename = "roomId")]
    Room(String),
    #[serde(rename = "workspaceId")]
    Workspace(String),
}

impl Scope {
    pub fn room(room_id: impl Into<String>) -> Self {
        Scope::Room(room_id.into())
    }

    pub fn room_id(&self) -> Option<&str> {
        match self {
            Scope::Room(id) => Some(id),
            Scope::Workspace(_) => None,
        }
    }

    pub fn workspace_id(&self) -> Option<&str> {
        match self {
            Scope::Workspace(id) => Some(id),
            Scope::Room(_) => None,
        }
    }

    /// Rebuilds a scope from the two nullable columns a table stores it in.
    pub fn from_columns(room_id: Option<String>, workspace_id: Option<String>) -> Option<Self> {
        match (room_id, workspace_id) {
            (Some(room), _) => Some(Scope::Room(room)),
            (None, Some(workspace)) => Some(Scope::Workspace(workspace)),
            (None, None) => None,
        }
    }

    fn validate(&self) -> StorageResult<()> {
        match self {
            Scope::Room(id) => require("scope", "roomId", id),
            Scope::Workspace(id) => require("scope", "workspaceId", id),
        }
    }
}

#[derive(Deserialize)]
struct ScopeFields {
    #[serde(rename = "roomId", default)]
    room_id: Option<String>,
    #[serde(rename = "workspaceId", default)]
    workspace_id: Option<String>,
}

/// Reads the flattened scope fields, rejecting non-string ids and entities
/// that claim both owners.
fn deserialize_scope<'de, D>(deserializer: D) -> Result<Option<Scope>, D::Error>
where
    D: Deserializer<'de>,
{
    let fields = ScopeFields::deserialize(deserializer)?;
    if fields.room_id.is_some() && fields.workspace_id.is_some() {
        return Err(de::Error::custom(
            "roomId and workspaceId are mutually exclusive",
        ));
    }
    Ok(Scope::from_columns(fields.room_id, fields.workspace_id))
}

/// Mutable entities saved through the generic upsert path.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Singular entity name used in errors and logs
    const KIND: &'static str;

    fn id(&self) -> Option<&str>;
    fn assign_id(&mut self, id: String);
    fn set_timestamps(&mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>);
    /// Rejects records that must never reach a store.
    fn validate(&self) -> StorageResult<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten, deserialize_with = "deserialize_scope")]
    pub scope: Option<Scope>,
    /// Request ids in display order
    #[serde(default)]
    pub requests: Vec<String>,
    #[serde(default)]
    pub metadata: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Collection {
    pub fn room_id(&self) -> Option<&str> {
        self.scope.as_ref().and_then(Scope::room_id)
    }
}

impl Record for Collection {
    const KIND: &'static str = "collection";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn assign_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn set_timestamps(&mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) {
        self.created_at = Some(created_at);
        self.updated_at = Some(updated_at);
    }

    fn validate(&self) -> StorageResult<()> {
        if let Some(id) = &self.id {
            validate_id(Self::KIND, id)?;
        }
        require(Self::KIND, "name", &self.name)?;
        if let Some(scope) = &self.scope {
            scope.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub variables: JsonMap,
    #[serde(flatten, deserialize_with = "deserialize_scope")]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Environment {
    pub fn room_id(&self) -> Option<&str> {
        self.scope.as_ref().and_then(Scope::room_id)
    }
}

impl Record for Environment {
    const KIND: &'static str = "environment";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn assign_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn set_timestamps(&mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) {
        self.created_at = Some(created_at);
        self.updated_at = Some(updated_at);
    }

    fn validate(&self) -> StorageResult<()> {
        if let Some(id) = &self.id {
            validate_id(Self::KIND, id)?;
        }
        require(Self::KIND, "name", &self.name)?;
        if let Some(scope) = &self.scope {
            scope.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub collection_id: String,
    pub name: String,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: JsonMap,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(default)]
    pub query_params: JsonMap,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub auth_type: String,
    #[serde(default)]
    pub auth_data: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for Request {
    const KIND: &'static str = "request";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn assign_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn set_timestamps(&mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) {
        self.created_at = Some(created_at);
        self.updated_at = Some(updated_at);
    }

    fn validate(&self) -> StorageResult<()> {
        if let Some(id) = &self.id {
            validate_id(Self::KIND, id)?;
        }
        require(Self::KIND, "collectionId", &self.collection_id)?;
        validate_id("collection", &self.collection_id)?;
        require(Self::KIND, "name", &self.name)?;
        require(Self::KIND, "method", &self.method)?;
        require(Self::KIND, "url", &self.url)
    }
}

/// One executed request. Insert-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default, rename = "responseTime")]
    pub response_time_ms: i64,
    #[serde(default)]
    pub headers: JsonMap,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response: String,
    /// Assigned on insert when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    pub const KIND: &'static str = "history entry";

    pub fn validate(&self) -> StorageResult<()> {
        if let Some(id) = &self.id {
            validate_id("history", id)?;
        }
        require(Self::KIND, "method", &self.method)?;
        require(Self::KIND, "url", &self.url)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    #[default]
    Free,
    Premium,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Free => "free",
            RoomType::Premium => "premium",
        }
    }
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(RoomType::Free),
            "premium" => Ok(RoomType::Premium),
            other => Err(StorageError::Validation(format!(
                "unsupported room type: {:?}",
                other
            ))),
        }
    }
}

/// A collaboration room as callers see it. The password hash is kept
/// separately in [`RoomRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Numeric key assigned by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Public random identifier, immutable once minted
    pub room_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub room_type: RoomType,
    pub device_limit: u32,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Storage-level room row: the room plus its password hash.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomRecord {
    pub room: Room,
    pub password_hash: String,
}

impl RoomRecord {
    pub fn validate(&self) -> StorageResult<()> {
        validate_id("room", &self.room.room_id)?;
        require("room", "name", &self.room.name)?;
        require("room", "password hash", &self.password_hash)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Public id of the owning room
    pub room_id: String,
    /// Caller-supplied, unique within the room
    pub device_id: String,
    pub device_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Input of the atomic count-and-insert admission.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceAdmission {
    pub room_id: String,
    pub device_id: String,
    /// Replaces the stored name on refresh when set
    pub device_name: Option<String>,
    /// Name used for a new device when `device_name` is unset
    pub default_name: String,
    pub device_limit: u32,
}

impl DeviceAdmission {
    pub fn name_for_insert(&self) -> &str {
        self.device_name.as_deref().unwrap_or(&self.default_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub device: Device,
    /// False when an already registered device only refreshed its liveness
    pub newly_registered: bool,
}

/// Entities a device pushes into a room in one unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatch {
    #[serde(default)]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub environments: Vec<Environment>,
    #[serde(default)]
    pub requests: Vec<Request>,
}

impl SyncBatch {
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty() && self.environments.is_empty() && self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.collections.len() + self.environments.len() + self.requests.len()
    }
}
