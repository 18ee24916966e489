//! Document backend on MongoDB.
//!
//! One collection per entity kind, maps stored as native subdocuments.
//! Identifiers are minted as ObjectId hex strings and stored as `_id`.
//! Batch and cascade operations run in multi-document transactions, which
//! need a replica set.

pub mod codec;

use crate::backend::{with_timeout, Backend, BackendKind};
use crate::error::{StorageError, StorageResult};
use crate::model::{
    effective_history_limit, now_millis, Admission, Collection, Device, DeviceAdmission,
    Environment, HistoryEntry, Record, Request, Room, RoomRecord, SyncBatch,
};
use async_trait::async_trait;
use codec::{bson_datetime, chrono_datetime, from_document, to_document};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    ClientOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexOptions,
    ReplaceOptions, ReturnDocument, UpdateOptions,
};
use mongodb::{Client, ClientSession, Collection as MongoCollection, Database, IndexModel};
use std::time::Duration;
use tracing::{debug, info, warn};

const DUPLICATE_KEY: i32 = 11000;

impl From<mongodb::error::Error> for StorageError {
    fn from(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::ServerSelection { .. }
            | ErrorKind::Io(_)
            | ErrorKind::ConnectionPoolCleared { .. }
            | ErrorKind::DnsResolve { .. } => StorageError::Connection(err.to_string()),
            ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY => {
                StorageError::Validation(format!("duplicate identifier: {}", e.message))
            }
            ErrorKind::Command(e) if e.code == DUPLICATE_KEY => {
                StorageError::Validation(format!("duplicate identifier: {}", e.message))
            }
            ErrorKind::BsonSerialization(_) | ErrorKind::BsonDeserialization(_) => {
                StorageError::Serialization(err.to_string())
            }
            _ => StorageError::Query(err.to_string()),
        }
    }
}

/// MongoDB implementation of [`Backend`]
#[derive(Debug, Clone)]
pub struct MongoBackend {
    client: Client,
    database: Database,
    collections: MongoCollection<Document>,
    environments: MongoCollection<Document>,
    requests: MongoCollection<Document>,
    history: MongoCollection<Document>,
    rooms: MongoCollection<Document>,
    devices: MongoCollection<Document>,
    counters: MongoCollection<Document>,
    op_timeout: Duration,
}

/// Whether a `hello` reply comes from a deployment that can run
/// multi-document transactions: a replica set member or a `mongos`.
pub fn supports_transactions(hello: &Document) -> bool {
    hello.get_str("setName").is_ok() || matches!(hello.get_str("msg"), Ok("isdbgrid"))
}

impl MongoBackend {
    /// Connects to `uri`, verifies the server can run transactions and
    /// creates the indexes the backend relies on.
    ///
    /// # Arguments
    ///
    /// * `uri` - Connection string, e.g. `mongodb://localhost:27017`
    /// * `database` - Database holding the storage collections
    /// * `connect_timeout` - Bound on establishing the connection
    /// * `op_timeout` - Bound on every later store call
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the server is unreachable or
    /// is a standalone `mongod`.
    pub async fn connect(
        uri: &str,
        database: &str,
        connect_timeout: Duration,
        op_timeout: Duration,
    ) -> StorageResult<Self> {
        debug!("Connecting to MongoDB database {}", database);
        let mut options = ClientOptions::parse(uri).await?;
        options.app_name = Some("resterx".to_string());
        options.connect_timeout = Some(connect_timeout);
        options.server_selection_timeout = Some(op_timeout);

        let client = Client::with_options(options)?;
        let db = client.database(database);
        let hello = with_timeout(connect_timeout, "mongodb hello", async {
            Ok(db.run_command(doc! { "hello": 1 }, None).await?)
        })
        .await?;
        if !supports_transactions(&hello) {
            return Err(StorageError::Connection(
                "MongoDB server is standalone; room deletes and sync batches need \
                 multi-document transactions (replica set or sharded cluster)"
                    .to_string(),
            ));
        }

        let backend = Self {
            collections: db.collection("storage_collections"),
            environments: db.collection("storage_environments"),
            requests: db.collection("storage_requests"),
            history: db.collection("storage_history"),
            rooms: db.collection("rooms"),
            devices: db.collection("room_devices"),
            counters: db.collection("counters"),
            database: db,
            client,
            op_timeout,
        };
        with_timeout(connect_timeout, "mongodb indexes", backend.ensure_indexes()).await?;

        info!("MongoDB storage ready ({})", database);
        Ok(backend)
    }

    async fn ensure_indexes(&self) -> StorageResult<()> {
        let index = |keys: Document, unique: bool| {
            IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(unique).build())
                .build()
        };
        self.collections
            .create_index(index(doc! { "roomId": 1 }, false), None)
            .await?;
        self.environments
            .create_index(index(doc! { "roomId": 1 }, false), None)
            .await?;
        self.requests
            .create_index(index(doc! { "collectionId": 1 }, false), None)
            .await?;
        self.history
            .create_index(index(doc! { "roomId": 1, "timestamp": -1 }, false), None)
            .await?;
        self.devices
            .create_index(index(doc! { "roomId": 1, "deviceId": 1 }, true), None)
            .await?;
        Ok(())
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    async fn created_at_of(
        &self,
        coll: &MongoCollection<Document>,
        filter: Document,
        session: Option<&mut ClientSession>,
    ) -> StorageResult<Option<chrono::DateTime<chrono::Utc>>> {
        let options = FindOneOptions::builder()
            .projection(doc! { "createdAt": 1 })
            .build();
        let existing = match session {
            Some(s) => coll.find_one_with_session(filter, options, s).await?,
            None => coll.find_one(filter, options).await?,
        };
        match existing.as_ref().and_then(|d| d.get_datetime("createdAt").ok()) {
            Some(ts) => Ok(Some(chrono_datetime(*ts)?)),
            None => Ok(None),
        }
    }

    /// Replace-or-insert keyed on the record id, preserving `createdAt`.
    async fn upsert_record<T: Record>(
        &self,
        coll: &MongoCollection<Document>,
        mut record: T,
        mut session: Option<&mut ClientSession>,
    ) -> StorageResult<T> {
        record.validate()?;
        let now = now_millis();
        let (id, created_at) = match record.id().map(str::to_string) {
            Some(id) => {
                let created = self
                    .created_at_of(coll, doc! { "_id": id.as_str() }, session.as_deref_mut())
                    .await?;
                (id, created.unwrap_or(now))
            }
            None => (ObjectId::new().to_hex(), now),
        };
        record.assign_id(id.clone());
        record.set_timestamps(created_at, now);

        let replacement = to_document(&record, "id")?;
        let options = ReplaceOptions::builder().upsert(true).build();
        let filter = doc! { "_id": id.as_str() };
        match session {
            Some(s) => {
                coll.replace_one_with_session(filter, replacement, options, s)
                    .await?
            }
            None => coll.replace_one(filter, replacement, options).await?,
        };
        debug!("Upserted {} {}", T::KIND, id);
        Ok(record)
    }

    async fn find_by_id<T: Record>(
        &self,
        coll: &MongoCollection<Document>,
        id: &str,
    ) -> StorageResult<T> {
        match coll.find_one(doc! { "_id": id }, None).await? {
            Some(doc) => from_document(doc, "id"),
            None => Err(StorageError::not_found(T::KIND, id)),
        }
    }

    async fn find_many<T: serde::de::DeserializeOwned>(
        &self,
        coll: &MongoCollection<Document>,
        filter: Document,
        options: FindOptions,
    ) -> StorageResult<Vec<T>> {
        let cursor = coll.find(filter, options).await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        docs.into_iter().map(|d| from_document(d, "id")).collect()
    }

    fn oldest_first() -> FindOptions {
        FindOptions::builder()
            .sort(doc! { "createdAt": 1, "_id": 1 })
            .build()
    }

    fn newest_first(limit: Option<i64>) -> FindOptions {
        FindOptions::builder()
            .sort(doc! { "timestamp": -1, "_id": -1 })
            .limit(effective_history_limit(limit))
            .build()
    }

    async fn delete_by_id(&self, coll: &MongoCollection<Document>, id: &str) -> StorageResult<()> {
        let result = coll.delete_one(doc! { "_id": id }, None).await?;
        debug!("Deleted {} document(s) with id {}", result.deleted_count, id);
        Ok(())
    }

    fn room_document(record: &RoomRecord) -> StorageResult<Document> {
        let mut doc = to_document(&record.room, "roomId")?;
        doc.insert("passwordHash", record.password_hash.as_str());
        Ok(doc)
    }

    fn room_from_document(mut doc: Document) -> StorageResult<RoomRecord> {
        let password_hash = match doc.remove("passwordHash") {
            Some(Bson::String(hash)) => hash,
            _ => {
                return Err(StorageError::Serialization(
                    "room document has no passwordHash".to_string(),
                ))
            }
        };
        doc.remove("deviceCount");
        let room: Room = from_document(doc, "roomId")?;
        Ok(RoomRecord {
            room,
            password_hash,
        })
    }

    async fn next_room_id(&self) -> StorageResult<i64> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let counter = self
            .counters
            .find_one_and_update(doc! { "_id": "rooms" }, doc! { "$inc": { "seq": 1i64 } }, options)
            .await?
            .ok_or_else(|| StorageError::Query("room counter was not created".to_string()))?;
        counter
            .get_i64("seq")
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn find_device(&self, room_id: &str, device_id: &str) -> StorageResult<Device> {
        match self
            .devices
            .find_one(doc! { "roomId": room_id, "deviceId": device_id }, None)
            .await?
        {
            Some(doc) => from_document(doc, "id"),
            None => Err(StorageError::not_found("device", device_id)),
        }
    }

    async fn refresh_device(&self, admission: &DeviceAdmission) -> StorageResult<bool> {
        let mut set = doc! { "lastActive": bson_datetime(&now_millis()) };
        if let Some(name) = &admission.device_name {
            set.insert("deviceName", name.as_str());
        }
        let result = self
            .devices
            .update_one(
                doc! { "roomId": admission.room_id.as_str(), "deviceId": admission.device_id.as_str() },
                doc! { "$set": set },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn adjust_device_count(&self, room_id: &str, delta: i64) -> StorageResult<()> {
        self.rooms
            .update_one(
                doc! { "_id": room_id },
                doc! { "$inc": { "deviceCount": delta } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn delete_room_in(&self, room_id: &str, session: &mut ClientSession) -> StorageResult<()> {
        let collection_ids = self
            .collections
            .distinct_with_session("_id", doc! { "roomId": room_id }, None, session)
            .await?;
        self.requests
            .delete_many_with_session(
                doc! { "collectionId": { "$in": collection_ids } },
                None,
                session,
            )
            .await?;
        let scoped = doc! { "roomId": room_id };
        self.devices
            .delete_many_with_session(scoped.clone(), None, session)
            .await?;
        self.collections
            .delete_many_with_session(scoped.clone(), None, session)
            .await?;
        self.environments
            .delete_many_with_session(scoped, None, session)
            .await?;
        let deleted = self
            .rooms
            .delete_one_with_session(doc! { "_id": room_id }, None, session)
            .await?
            .deleted_count;
        if deleted == 0 {
            return Err(StorageError::not_found("room", room_id));
        }
        Ok(())
    }

    async fn apply_batch_in(
        &self,
        batch: SyncBatch,
        session: &mut ClientSession,
    ) -> StorageResult<SyncBatch> {
        let mut stored = SyncBatch::default();
        for collection in batch.collections {
            stored.collections.push(
                self.upsert_record(&self.collections, collection, Some(&mut *session))
                    .await?,
            );
        }
        for environment in batch.environments {
            stored.environments.push(
                self.upsert_record(&self.environments, environment, Some(&mut *session))
                    .await?,
            );
        }
        for request in batch.requests {
            stored.requests.push(
                self.upsert_record(&self.requests, request, Some(&mut *session))
                    .await?,
            );
        }
        Ok(stored)
    }

    /// Commits on success, aborts on failure and returns the original error.
    async fn finish_transaction<T>(
        session: &mut ClientSession,
        result: StorageResult<T>,
    ) -> StorageResult<T> {
        match result {
            Ok(value) => {
                session.commit_transaction().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!("Failed to abort MongoDB transaction: {}", abort_err);
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl Backend for MongoBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    async fn save_collection(&self, collection: Collection) -> StorageResult<Collection> {
        with_timeout(
            self.op_timeout,
            "save_collection",
            self.upsert_record(&self.collections, collection, None),
        )
        .await
    }

    async fn get_collection(&self, id: &str) -> StorageResult<Collection> {
        with_timeout(
            self.op_timeout,
            "get_collection",
            self.find_by_id(&self.collections, id),
        )
        .await
    }

    async fn get_collections_by_room(&self, room_id: &str) -> StorageResult<Vec<Collection>> {
        with_timeout(
            self.op_timeout,
            "get_collections_by_room",
            self.find_many(
                &self.collections,
                doc! { "roomId": room_id },
                Self::oldest_first(),
            ),
        )
        .await
    }

    async fn get_all_collections(&self) -> StorageResult<Vec<Collection>> {
        with_timeout(
            self.op_timeout,
            "get_all_collections",
            self.find_many(&self.collections, doc! {}, Self::oldest_first()),
        )
        .await
    }

    async fn delete_collection(&self, id: &str) -> StorageResult<()> {
        with_timeout(
            self.op_timeout,
            "delete_collection",
            self.delete_by_id(&self.collections, id),
        )
        .await
    }

    async fn save_environment(&self, environment: Environment) -> StorageResult<Environment> {
        with_timeout(
            self.op_timeout,
            "save_environment",
            self.upsert_record(&self.environments, environment, None),
        )
        .await
    }

    async fn get_environment(&self, id: &str) -> StorageResult<Environment> {
        with_timeout(
            self.op_timeout,
            "get_environment",
            self.find_by_id(&self.environments, id),
        )
        .await
    }

    async fn get_environments_by_room(&self, room_id: &str) -> StorageResult<Vec<Environment>> {
        with_timeout(
            self.op_timeout,
            "get_environments_by_room",
            self.find_many(
                &self.environments,
                doc! { "roomId": room_id },
                Self::oldest_first(),
            ),
        )
        .await
    }

    async fn get_all_environments(&self) -> StorageResult<Vec<Environment>> {
        with_timeout(
            self.op_timeout,
            "get_all_environments",
            self.find_many(&self.environments, doc! {}, Self::oldest_first()),
        )
        .await
    }

    async fn delete_environment(&self, id: &str) -> StorageResult<()> {
        with_timeout(
            self.op_timeout,
            "delete_environment",
            self.delete_by_id(&self.environments, id),
        )
        .await
    }

    async fn save_request(&self, request: Request) -> StorageResult<Request> {
        with_timeout(
            self.op_timeout,
            "save_request",
            self.upsert_record(&self.requests, request, None),
        )
        .await
    }

    async fn get_request(&self, id: &str) -> StorageResult<Request> {
        with_timeout(
            self.op_timeout,
            "get_request",
            self.find_by_id(&self.requests, id),
        )
        .await
    }

    async fn get_requests_by_collection(
        &self,
        collection_id: &str,
    ) -> StorageResult<Vec<Request>> {
        with_timeout(
            self.op_timeout,
            "get_requests_by_collection",
            self.find_many(
                &self.requests,
                doc! { "collectionId": collection_id },
                Self::oldest_first(),
            ),
        )
        .await
    }

    async fn get_all_requests(&self) -> StorageResult<Vec<Request>> {
        with_timeout(
            self.op_timeout,
            "get_all_requests",
            self.find_many(&self.requests, doc! {}, Self::oldest_first()),
        )
        .await
    }

    async fn delete_request(&self, id: &str) -> StorageResult<()> {
        with_timeout(
            self.op_timeout,
            "delete_request",
            self.delete_by_id(&self.requests, id),
        )
        .await
    }

    async fn save_history(&self, mut entry: HistoryEntry) -> StorageResult<HistoryEntry> {
        with_timeout(self.op_timeout, "save_history", async {
            entry.validate()?;
            if entry.id.is_none() {
                entry.id = Some(ObjectId::new().to_hex());
            }
            let at = match entry.timestamp {
                Some(ts) => chrono_datetime(bson_datetime(&ts))?,
                None => now_millis(),
            };
            entry.timestamp = Some(at);
            self.history
                .insert_one(to_document(&entry, "id")?, None)
                .await?;
            Ok(entry)
        })
        .await
    }

    async fn get_history_by_room(
        &self,
        room_id: &str,
        limit: Option<i64>,
    ) -> StorageResult<Vec<HistoryEntry>> {
        with_timeout(
            self.op_timeout,
            "get_history_by_room",
            self.find_many(
                &self.history,
                doc! { "roomId": room_id },
                Self::newest_first(limit),
            ),
        )
        .await
    }

    async fn get_all_history(&self, limit: Option<i64>) -> StorageResult<Vec<HistoryEntry>> {
        with_timeout(
            self.op_timeout,
            "get_all_history",
            self.find_many(&self.history, doc! {}, Self::newest_first(limit)),
        )
        .await
    }

    async fn delete_history(&self, id: &str) -> StorageResult<()> {
        with_timeout(
            self.op_timeout,
            "delete_history",
            self.delete_by_id(&self.history, id),
        )
        .await
    }

    async fn save_room(&self, mut record: RoomRecord) -> StorageResult<RoomRecord> {
        with_timeout(self.op_timeout, "save_room", async {
            record.validate()?;
            let now = now_millis();
            let room_id = record.room.room_id.clone();

            if record.room.id.is_none() {
                record.room.id = Some(self.next_room_id().await?);
                record.room.created_at = Some(now);
                record.room.updated_at = Some(now);
                let mut doc = Self::room_document(&record)?;
                doc.insert("deviceCount", 0i64);
                // A taken roomId surfaces as a duplicate-key validation error.
                self.rooms.insert_one(doc, None).await?;
            } else {
                let created = self
                    .created_at_of(&self.rooms, doc! { "_id": room_id.as_str() }, None)
                    .await?;
                record.room.created_at = Some(created.unwrap_or(now));
                record.room.updated_at = Some(now);
                let mut fields = Self::room_document(&record)?;
                fields.remove("_id");
                // $set keeps the deviceCount maintained by admission.
                self.rooms
                    .update_one(
                        doc! { "_id": room_id.as_str() },
                        doc! { "$set": fields, "$setOnInsert": { "deviceCount": 0i64 } },
                        UpdateOptions::builder().upsert(true).build(),
                    )
                    .await?;
            }
            debug!("Saved room {}", room_id);
            Ok(record)
        })
        .await
    }

    async fn get_room(&self, room_id: &str) -> StorageResult<RoomRecord> {
        with_timeout(self.op_timeout, "get_room", async {
            match self.rooms.find_one(doc! { "_id": room_id }, None).await? {
                Some(doc) => Self::room_from_document(doc),
                None => Err(StorageError::not_found("room", room_id)),
            }
        })
        .await
    }

    async fn get_room_devices(&self, room_id: &str) -> StorageResult<Vec<Device>> {
        let options = FindOptions::builder()
            .sort(doc! { "lastActive": -1, "createdAt": -1 })
            .build();
        with_timeout(
            self.op_timeout,
            "get_room_devices",
            self.find_many(&self.devices, doc! { "roomId": room_id }, options),
        )
        .await
    }

    async fn admit_device(&self, admission: DeviceAdmission) -> StorageResult<Admission> {
        with_timeout(self.op_timeout, "admit_device", async {
            let room_id = admission.room_id.as_str();
            if self.refresh_device(&admission).await? {
                return Ok(Admission {
                    device: self.find_device(room_id, &admission.device_id).await?,
                    newly_registered: false,
                });
            }

            // Reserve a slot with a compare-and-swap on the room's counter.
            let reserved = self
                .rooms
                .find_one_and_update(
                    doc! {
                        "_id": room_id,
                        "deviceCount": { "$lt": i64::from(admission.device_limit) },
                    },
                    doc! { "$inc": { "deviceCount": 1i64 } },
                    None,
                )
                .await?;
            if reserved.is_none() {
                return match self.rooms.find_one(doc! { "_id": room_id }, None).await? {
                    Some(_) => Err(StorageError::CapacityExceeded {
                        room_id: room_id.to_string(),
                        limit: admission.device_limit,
                    }),
                    None => Err(StorageError::not_found("room", room_id)),
                };
            }

            let now = now_millis();
            let device = Device {
                id: Some(ObjectId::new().to_hex()),
                room_id: room_id.to_string(),
                device_id: admission.device_id.clone(),
                device_name: admission.name_for_insert().to_string(),
                last_active: Some(now),
                created_at: Some(now),
            };
            match self.devices.insert_one(to_document(&device, "id")?, None).await {
                Ok(_) => Ok(Admission {
                    device,
                    newly_registered: true,
                }),
                Err(err) => {
                    self.adjust_device_count(room_id, -1).await?;
                    match StorageError::from(err) {
                        // A concurrent join registered the same device first.
                        StorageError::Validation(_) => {
                            self.refresh_device(&admission).await?;
                            Ok(Admission {
                                device: self.find_device(room_id, &admission.device_id).await?,
                                newly_registered: false,
                            })
                        }
                        other => Err(other),
                    }
                }
            }
        })
        .await
    }

    async fn remove_device(&self, room_id: &str, device_id: &str) -> StorageResult<()> {
        with_timeout(self.op_timeout, "remove_device", async {
            let result = self
                .devices
                .delete_one(doc! { "roomId": room_id, "deviceId": device_id }, None)
                .await?;
            if result.deleted_count > 0 {
                self.adjust_device_count(room_id, -1).await?;
            }
            Ok(())
        })
        .await
    }

    async fn delete_room(&self, room_id: &str) -> StorageResult<()> {
        info!("Deleting room {} and its contents", room_id);
        with_timeout(self.op_timeout, "delete_room", async {
            let mut session = self.client.start_session(None).await?;
            session.start_transaction(None).await?;
            let result = self.delete_room_in(room_id, &mut session).await;
            Self::finish_transaction(&mut session, result).await
        })
        .await
    }

    async fn apply_sync_batch(&self, batch: SyncBatch) -> StorageResult<SyncBatch> {
        debug!("Applying sync batch of {} entities", batch.len());
        with_timeout(self.op_timeout, "apply_sync_batch", async {
            let mut session = self.client.start_session(None).await?;
            session.start_transaction(None).await?;
            let result = self.apply_batch_in(batch, &mut session).await;
            Self::finish_transaction(&mut session, result).await
        })
        .await
    }

    async fn ping(&self) -> StorageResult<()> {
        with_timeout(self.op_timeout, "ping", async {
            self.database.run_command(doc! { "ping": 1 }, None).await?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> StorageResult<()> {
        with_timeout(self.op_timeout, "close", async {
            self.client.clone().shutdown().await;
            Ok(())
        })
        .await?;
        info!("MongoDB storage closed");
        Ok(())
    }
}
