//! Storage layer for resterx
//!
//! This crate persists collections, environments, requests, history, rooms
//! and devices behind one [`Backend`] trait with two implementations:
//!
//! * [`MongoBackend`] - a MongoDB document store
//! * [`SqliteBackend`] - an embedded SQLite file
//!
//! [`StorageManager`] holds a primary and an optional fallback backend and
//! retries failed calls on the fallback. Build one with [`StorageFactory`] or
//! [`StorageManager::init`].

pub mod backend;
pub mod error;
pub mod factory;
pub mod manager;
pub mod model;
pub mod mongo;
pub mod sqlite;

pub use backend::{Backend, BackendKind};
pub use error::{StorageError, StorageResult};
pub use factory::StorageFactory;
pub use manager::StorageManager;
pub use model::*;
pub use mongo::MongoBackend;
pub use sqlite::SqliteBackend;
