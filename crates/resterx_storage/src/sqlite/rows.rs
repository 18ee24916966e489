//! Row mapping and write statements for the SQLite backend.
//!
//! Writers take a `&mut SqliteConnection` so the same code runs on a pooled
//! connection or inside a transaction.

use super::codec;
use crate::error::{StorageError, StorageResult};
use crate::model::{
    now_millis, Collection, Device, Environment, HistoryEntry, Record, Request, Room, RoomRecord,
    RoomType, Scope,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

pub const COLLECTION_COLUMNS: &str =
    "id, name, description, room_id, workspace_id, requests, metadata, created_at, updated_at";
pub const ENVIRONMENT_COLUMNS: &str =
    "id, name, variables, room_id, workspace_id, is_active, created_at, updated_at";
pub const REQUEST_COLUMNS: &str = "id, collection_id, name, method, url, headers, body, \
     query_params, auth_type, auth_data, created_at, updated_at";
pub const HISTORY_COLUMNS: &str =
    "id, room_id, method, url, status_code, response_time, headers, response, timestamp";
pub const ROOM_COLUMNS: &str = "id, room_id, name, password_hash, description, room_type, \
     device_limit, is_active, created_at, updated_at";
pub const DEVICE_COLUMNS: &str = "id, room_id, device_id, device_name, last_active, created_at";

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn scope_columns(scope: &Option<Scope>) -> (Option<&str>, Option<&str>) {
    match scope {
        Some(scope) => (scope.room_id(), scope.workspace_id()),
        None => (None, None),
    }
}

fn timestamp(row: &SqliteRow, column: &str) -> StorageResult<chrono::DateTime<chrono::Utc>> {
    codec::from_millis(column, row.try_get(column)?)
}

fn map_column(row: &SqliteRow, column: &str) -> StorageResult<crate::model::JsonMap> {
    let text: String = row.try_get(column)?;
    codec::decode_map(column, &text)
}

pub fn collection_from_row(row: &SqliteRow) -> StorageResult<Collection> {
    let requests: String = row.try_get("requests")?;
    Ok(Collection {
        id: Some(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        scope: Scope::from_columns(row.try_get("room_id")?, row.try_get("workspace_id")?),
        requests: codec::decode_list("requests", &requests)?,
        metadata: map_column(row, "metadata")?,
        created_at: Some(timestamp(row, "created_at")?),
        updated_at: Some(timestamp(row, "updated_at")?),
    })
}

pub fn environment_from_row(row: &SqliteRow) -> StorageResult<Environment> {
    Ok(Environment {
        id: Some(row.try_get("id")?),
        name: row.try_get("name")?,
        variables: map_column(row, "variables")?,
        scope: Scope::from_columns(row.try_get("room_id")?, row.try_get("workspace_id")?),
        is_active: row.try_get("is_active")?,
        created_at: Some(timestamp(row, "created_at")?),
        updated_at: Some(timestamp(row, "updated_at")?),
    })
}

pub fn request_from_row(row: &SqliteRow) -> StorageResult<Request> {
    Ok(Request {
        id: Some(row.try_get("id")?),
        collection_id: row.try_get("collection_id")?,
        name: row.try_get("name")?,
        method: row.try_get("method")?,
        url: row.try_get("url")?,
        headers: map_column(row, "headers")?,
        body: row.try_get("body")?,
        query_params: map_column(row, "query_params")?,
        auth_type: row.try_get("auth_type")?,
        auth_data: map_column(row, "auth_data")?,
        created_at: Some(timestamp(row, "created_at")?),
        updated_at: Some(timestamp(row, "updated_at")?),
    })
}

pub fn history_from_row(row: &SqliteRow) -> StorageResult<HistoryEntry> {
    let status_code: i64 = row.try_get("status_code")?;
    Ok(HistoryEntry {
        id: Some(row.try_get("id")?),
        room_id: row.try_get("room_id")?,
        method: row.try_get("method")?,
        url: row.try_get("url")?,
        status_code: u16::try_from(status_code).map_err(|_| {
            StorageError::Serialization(format!("status_code {} out of range", status_code))
        })?,
        response_time_ms: row.try_get("response_time")?,
        headers: map_column(row, "headers")?,
        response: row.try_get("response")?,
        timestamp: Some(timestamp(row, "timestamp")?),
    })
}

pub fn room_from_row(row: &SqliteRow) -> StorageResult<RoomRecord> {
    let room_type: String = row.try_get("room_type")?;
    let device_limit: i64 = row.try_get("device_limit")?;
    Ok(RoomRecord {
        room: Room {
            id: Some(row.try_get("id")?),
            room_id: row.try_get("room_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            room_type: room_type
                .parse::<RoomType>()
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
            device_limit: u32::try_from(device_limit).map_err(|_| {
                StorageError::Serialization(format!("device_limit {} out of range", device_limit))
            })?,
            is_active: row.try_get("is_active")?,
            created_at: Some(timestamp(row, "created_at")?),
            updated_at: Some(timestamp(row, "updated_at")?),
        },
        password_hash: row.try_get("password_hash")?,
    })
}

pub fn device_from_row(row: &SqliteRow) -> StorageResult<Device> {
    Ok(Device {
        id: Some(row.try_get("id")?),
        room_id: row.try_get("room_id")?,
        device_id: row.try_get("device_id")?,
        device_name: row.try_get("device_name")?,
        last_active: Some(timestamp(row, "last_active")?),
        created_at: Some(timestamp(row, "created_at")?),
    })
}

pub async fn upsert_collection(
    conn: &mut SqliteConnection,
    mut collection: Collection,
) -> StorageResult<Collection> {
    collection.validate()?;
    let id = collection.id.clone().unwrap_or_else(new_id);
    let now = now_millis();
    let (room_id, workspace_id) = scope_columns(&collection.scope);

    let created_at: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO storage_collections
            (id, name, description, room_id, workspace_id, requests, metadata, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            room_id = excluded.room_id,
            workspace_id = excluded.workspace_id,
            requests = excluded.requests,
            metadata = excluded.metadata,
            updated_at = excluded.updated_at
        RETURNING created_at
        "#,
    )
    .bind(&id)
    .bind(&collection.name)
    .bind(&collection.description)
    .bind(room_id)
    .bind(workspace_id)
    .bind(codec::encode_list(&collection.requests)?)
    .bind(codec::encode_map(&collection.metadata)?)
    .bind(codec::to_millis(&now))
    .bind(codec::to_millis(&now))
    .fetch_one(&mut *conn)
    .await?;

    collection.assign_id(id);
    collection.set_timestamps(codec::from_millis("created_at", created_at)?, now);
    Ok(collection)
}

pub async fn upsert_environment(
    conn: &mut SqliteConnection,
    mut environment: Environment,
) -> StorageResult<Environment> {
    environment.validate()?;
    let id = environment.id.clone().unwrap_or_else(new_id);
    let now = now_millis();
    let (room_id, workspace_id) = scope_columns(&environment.scope);

    let created_at: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO storage_environments
            (id, name, variables, room_id, workspace_id, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            variables = excluded.variables,
            room_id = excluded.room_id,
            workspace_id = excluded.workspace_id,
            is_active = excluded.is_active,
            updated_at = excluded.updated_at
        RETURNING created_at
        "#,
    )
    .bind(&id)
    .bind(&environment.name)
    .bind(codec::encode_map(&environment.variables)?)
    .bind(room_id)
    .bind(workspace_id)
    .bind(environment.is_active)
    .bind(codec::to_millis(&now))
    .bind(codec::to_millis(&now))
    .fetch_one(&mut *conn)
    .await?;

    environment.assign_id(id);
    environment.set_timestamps(codec::from_millis("created_at", created_at)?, now);
    Ok(environment)
}

pub async fn upsert_request(
    conn: &mut SqliteConnection,
    mut request: Request,
) -> StorageResult<Request> {
    request.validate()?;
    let id = request.id.clone().unwrap_or_else(new_id);
    let now = now_millis();

    let created_at: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO storage_requests
            (id, collection_id, name, method, url, headers, body, query_params,
             auth_type, auth_data, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            collection_id = excluded.collection_id,
            name = excluded.name,
            method = excluded.method,
            url = excluded.url,
            headers = excluded.headers,
            body = excluded.body,
            query_params = excluded.query_params,
            auth_type = excluded.auth_type,
            auth_data = excluded.auth_data,
            updated_at = excluded.updated_at
        RETURNING created_at
        "#,
    )
    .bind(&id)
    .bind(&request.collection_id)
    .bind(&request.name)
    .bind(&request.method)
    .bind(&request.url)
    .bind(codec::encode_map(&request.headers)?)
    .bind(&request.body)
    .bind(codec::encode_map(&request.query_params)?)
    .bind(&request.auth_type)
    .bind(codec::encode_map(&request.auth_data)?)
    .bind(codec::to_millis(&now))
    .bind(codec::to_millis(&now))
    .fetch_one(&mut *conn)
    .await?;

    request.assign_id(id);
    request.set_timestamps(codec::from_millis("created_at", created_at)?, now);
    Ok(request)
}

pub async fn insert_history(
    conn: &mut SqliteConnection,
    mut entry: HistoryEntry,
) -> StorageResult<HistoryEntry> {
    entry.validate()?;
    let id = entry.id.clone().unwrap_or_else(new_id);
    let at = match entry.timestamp {
        Some(ts) => codec::from_millis("timestamp", codec::to_millis(&ts))?,
        None => now_millis(),
    };

    sqlx::query(
        r#"
        INSERT INTO storage_history
            (id, room_id, method, url, status_code, response_time, headers, response, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(entry.room_id.as_deref())
    .bind(&entry.method)
    .bind(&entry.url)
    .bind(i64::from(entry.status_code))
    .bind(entry.response_time_ms)
    .bind(codec::encode_map(&entry.headers)?)
    .bind(&entry.response)
    .bind(codec::to_millis(&at))
    .execute(&mut *conn)
    .await?;

    entry.id = Some(id);
    entry.timestamp = Some(at);
    Ok(entry)
}

pub async fn upsert_room(
    conn: &mut SqliteConnection,
    mut record: RoomRecord,
) -> StorageResult<RoomRecord> {
    record.validate()?;
    let now = now_millis();
    let room = &record.room;

    // A NULL id lets SQLite assign the next key.
    let row = sqlx::query(
        r#"
        INSERT INTO rooms
            (id, room_id, name, password_hash, description, room_type,
             device_limit, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            room_id = excluded.room_id,
            name = excluded.name,
            password_hash = excluded.password_hash,
            description = excluded.description,
            room_type = excluded.room_type,
            device_limit = excluded.device_limit,
            is_active = excluded.is_active,
            updated_at = excluded.updated_at
        RETURNING id, created_at
        "#,
    )
    .bind(room.id)
    .bind(&room.room_id)
    .bind(&room.name)
    .bind(&record.password_hash)
    .bind(&room.description)
    .bind(room.room_type.as_str())
    .bind(i64::from(room.device_limit))
    .bind(room.is_active)
    .bind(codec::to_millis(&now))
    .bind(codec::to_millis(&now))
    .fetch_one(&mut *conn)
    .await?;

    record.room.id = Some(row.try_get("id")?);
    record.room.created_at = Some(timestamp(&row, "created_at")?);
    record.room.updated_at = Some(now);
    Ok(record)
}
