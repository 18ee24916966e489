//! Column codecs for the SQLite backend.
//!
//! Maps and lists live in TEXT columns as JSON; timestamps live in INTEGER
//! columns as epoch milliseconds. An empty TEXT column decodes to an empty
//! value so rows written by older clients stay readable.

use crate::error::{StorageError, StorageResult};
use crate::model::{from_epoch_millis, JsonMap};
use chrono::{DateTime, Utc};

pub fn encode_map(map: &JsonMap) -> StorageResult<String> {
    Ok(serde_json::to_string(map)?)
}

pub fn decode_map(column: &str, text: &str) -> StorageResult<JsonMap> {
    if text.trim().is_empty() {
        return Ok(JsonMap::new());
    }
    serde_json::from_str(text)
        .map_err(|e| StorageError::Serialization(format!("column {}: {}", column, e)))
}

pub fn encode_list(items: &[String]) -> StorageResult<String> {
    Ok(serde_json::to_string(items)?)
}

pub fn decode_list(column: &str, text: &str) -> StorageResult<Vec<String>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(text)
        .map_err(|e| StorageError::Serialization(format!("column {}: {}", column, e)))
}

pub fn to_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub fn from_millis(column: &str, millis: i64) -> StorageResult<DateTime<Utc>> {
    from_epoch_millis(millis).ok_or_else(|| {
        StorageError::Serialization(format!("column {}: timestamp {} out of range", column, millis))
    })
}
