pub mod auth;
pub mod health;
pub mod history;
pub mod rooms;
pub mod storage;
pub mod sync;
