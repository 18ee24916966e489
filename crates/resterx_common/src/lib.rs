// --- File: crates/resterx_common/src/lib.rs ---

pub mod error;   // Error handling
pub mod http;    // HTTP response mapping
pub mod logging; // Logging utilities

// Re-export error types and utilities for easier access
pub use error::{auth_error, HttpStatusCode, ResterxError};

pub use http::IntoHttpResponse;

pub use logging::{init, init_with_level};
