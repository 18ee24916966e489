// --- File: crates/resterx_config/src/models.rs ---

use serde::{Deserialize, Serialize};

// --- General Server Config ---
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

// --- Storage Config ---
// MongoDB is optional; without a URI the SQLite store runs alone.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Document-store connection string, e.g. `mongodb://localhost:27017`
    #[serde(default)]
    pub mongodb_uri: Option<String>,
    #[serde(default = "default_mongodb_database")]
    pub mongodb_database: String,
    /// Path of the embedded SQLite file
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    /// Upper bound for a single store call, in seconds
    #[serde(default = "default_op_timeout_secs")]
    pub op_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_mongodb_database() -> String {
    "resterx".to_string()
}

fn default_sqlite_path() -> String {
    "resterx_storage.db".to_string()
}

fn default_op_timeout_secs() -> u64 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mongodb_uri: None,
            mongodb_database: default_mongodb_database(),
            sqlite_path: default_sqlite_path(),
            op_timeout_secs: default_op_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

// --- Auth Config ---
// The signing secret is normally the "secret_from_env" marker, resolved at load time.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: i64,
}

fn default_token_ttl_secs() -> i64 {
    86_400
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "secret_from_env".to_string(),
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

// --- Unified App Configuration ---
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Minimum tracing level, e.g. "info" or "debug"
    #[serde(default)]
    pub log_level: Option<String>,
}
