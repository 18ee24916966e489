//! Entity <-> BSON document conversion.
//!
//! Entities serialize through serde to a camelCase document. The key field
//! moves to `_id`, and RFC 3339 timestamp strings become BSON datetimes so
//! they sort and compare natively. Decoding reverses both steps.

use crate::error::{StorageError, StorageResult};
use crate::model::from_epoch_millis;
use chrono::{DateTime, SecondsFormat, Utc};
use mongodb::bson::{self, Bson, Document};
use serde::de::DeserializeOwned;
use serde::Serialize;

const TIMESTAMP_FIELDS: &[&str] = &["createdAt", "updatedAt", "timestamp", "lastActive"];

impl From<bson::ser::Error> for StorageError {
    fn from(err: bson::ser::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for StorageError {
    fn from(err: bson::de::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

pub fn bson_datetime(ts: &DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(ts.timestamp_millis())
}

pub fn chrono_datetime(ts: bson::DateTime) -> StorageResult<DateTime<Utc>> {
    from_epoch_millis(ts.timestamp_millis()).ok_or_else(|| {
        StorageError::Serialization(format!("datetime {} out of range", ts.timestamp_millis()))
    })
}

/// Serializes `entity`, storing its `key` field as `_id`.
pub fn to_document<T: Serialize>(entity: &T, key: &str) -> StorageResult<Document> {
    let mut doc = bson::to_document(entity)?;
    if let Some(id) = doc.remove(key) {
        doc.insert("_id", id);
    }
    for field in TIMESTAMP_FIELDS {
        if let Some(Bson::String(text)) = doc.get(*field) {
            let parsed = DateTime::parse_from_rfc3339(text)
                .map_err(|e| StorageError::Serialization(format!("{}: {}", field, e)))?;
            let value = Bson::DateTime(bson_datetime(&parsed.with_timezone(&Utc)));
            doc.insert(*field, value);
        }
    }
    Ok(doc)
}

/// Deserializes a stored document, restoring `_id` into the `key` field.
pub fn from_document<T: DeserializeOwned>(mut doc: Document, key: &str) -> StorageResult<T> {
    if let Some(id) = doc.remove("_id") {
        let id = match id {
            Bson::ObjectId(oid) => Bson::String(oid.to_hex()),
            other => other,
        };
        doc.insert(key, id);
    }
    for field in TIMESTAMP_FIELDS {
        if let Some(Bson::DateTime(ts)) = doc.get(*field) {
            let text = chrono_datetime(*ts)?.to_rfc3339_opts(SecondsFormat::Millis, true);
            doc.insert(*field, Bson::String(text));
        }
    }
    Ok(bson::from_document(doc)?)
}
