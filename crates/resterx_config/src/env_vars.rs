//! Environment variable handling for resterx.
//!
//! Configuration values use `RESTERX__SECTION__KEY`, secrets use
//! `RESTERX_SECRET_SECTION_KEY`. The storage layer also honours the
//! unprefixed variables (`MONGODB_URI`, `MONGODB_DATABASE`, `SQLITE_PATH`)
//! older deployments export.

use crate::models::AppConfig;
use std::env;
use tracing::warn;

/// The default prefix for configuration environment variables
pub const DEFAULT_PREFIX: &str = "RESTERX";

/// The prefix for secret environment variables
pub const SECRET_PREFIX: &str = "RESTERX_SECRET";

/// The separator for configuration environment variables
pub const CONFIG_SEPARATOR: &str = "__";

/// The separator for secret environment variables
pub const SECRET_SEPARATOR: &str = "_";

/// Marker value replaced by an environment variable at load time
pub const SECRET_MARKER: &str = "secret_from_env";

/// Get the prefix for configuration environment variables
pub fn get_config_prefix() -> String {
    env::var("PREFIX").unwrap_or_else(|_| DEFAULT_PREFIX.to_string())
}

/// Convert a configuration path to an environment variable name
///
/// `"storage.sqlite_path"` becomes `"RESTERX__STORAGE__SQLITE_PATH"`.
pub fn config_path_to_env_var(path: &str) -> String {
    let prefix = get_config_prefix();
    let path = path.replace('.', CONFIG_SEPARATOR);
    format!("{}{}{}", prefix, CONFIG_SEPARATOR, path).to_uppercase()
}

/// Convert a secret path to an environment variable name
///
/// `"auth.jwt_secret"` becomes `"RESTERX_SECRET_AUTH_JWT_SECRET"`.
pub fn secret_path_to_env_var(path: &str) -> String {
    let path = path.replace('.', SECRET_SEPARATOR);
    format!("{}{}{}", SECRET_PREFIX, SECRET_SEPARATOR, path).to_uppercase()
}

/// Legacy naming: `"auth.jwt_secret"` becomes `"AUTH_JWT_SECRET"`.
pub fn legacy_secret_path_to_env_var(path: &str) -> String {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.len() < 2 {
        return path.to_uppercase();
    }

    let service = parts[0];
    let key = parts[1..].join(SECRET_SEPARATOR);
    format!("{}_{}", service, key).to_uppercase()
}

/// Look up a secret, trying the prefixed name before the legacy one.
pub fn get_secret_env_var(path: &str) -> Option<String> {
    if let Ok(value) = env::var(secret_path_to_env_var(path)) {
        return Some(value);
    }
    env::var(legacy_secret_path_to_env_var(path)).ok()
}

/// Replace every `"secret_from_env"` string in a JSON tree with the
/// matching secret environment variable.
///
/// Returns `true` if at least one value was replaced.
pub fn inject_env_secrets(value: &mut serde_json::Value) -> bool {
    use serde_json::Value;

    fn walk(path: Vec<String>, obj: &mut Value) -> bool {
        let mut replaced = false;

        match obj {
            Value::Object(map) => {
                for (k, v) in map.iter_mut() {
                    let mut new_path = path.clone();
                    new_path.push(k.to_string());
                    replaced |= walk(new_path, v);
                }
            }
            Value::String(s) if s == SECRET_MARKER => {
                let path_str = path.join(".");
                if let Some(env_val) = get_secret_env_var(&path_str) {
                    *s = env_val;
                    replaced = true;
                } else {
                    warn!("Secret for {} not found in environment", path_str);
                }
            }
            _ => {}
        }

        replaced
    }

    walk(vec![], value)
}

/// Fill storage settings from the unprefixed variables when the
/// prefixed ones did not set them.
pub fn apply_legacy_storage_env(config: &mut AppConfig) {
    if config.storage.mongodb_uri.is_none() {
        config.storage.mongodb_uri = env::var("MONGODB_URI").ok().filter(|s| !s.is_empty());
    }
    if env::var(config_path_to_env_var("storage.mongodb_database")).is_err() {
        if let Ok(name) = env::var("MONGODB_DATABASE") {
            if !name.is_empty() {
                config.storage.mongodb_database = name;
            }
        }
    }
    if env::var(config_path_to_env_var("storage.sqlite_path")).is_err() {
        if let Ok(path) = env::var("SQLITE_PATH") {
            if !path.is_empty() {
                config.storage.sqlite_path = path;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_to_env_var() {
        assert_eq!(
            config_path_to_env_var("storage.sqlite_path"),
            "RESTERX__STORAGE__SQLITE_PATH"
        );
        assert_eq!(
            config_path_to_env_var("server.host"),
            "RESTERX__SERVER__HOST"
        );
    }

    #[test]
    fn test_secret_path_to_env_var() {
        assert_eq!(
            secret_path_to_env_var("auth.jwt_secret"),
            "RESTERX_SECRET_AUTH_JWT_SECRET"
        );
    }

    #[test]
    fn test_legacy_secret_path_to_env_var() {
        assert_eq!(
            legacy_secret_path_to_env_var("auth.jwt_secret"),
            "AUTH_JWT_SECRET"
        );
        assert_eq!(legacy_secret_path_to_env_var("token"), "TOKEN");
    }

    #[test]
    fn test_inject_env_secrets_replaces_marker() {
        env::set_var("RESTERX_SECRET_TESTSVC_SIGNING_KEY", "s3cr3t");
        let mut value = serde_json::json!({
            "testsvc": { "signing_key": "secret_from_env", "plain": "keep" }
        });

        assert!(inject_env_secrets(&mut value));
        assert_eq!(value["testsvc"]["signing_key"], "s3cr3t");
        assert_eq!(value["testsvc"]["plain"], "keep");
        env::remove_var("RESTERX_SECRET_TESTSVC_SIGNING_KEY");
    }
}
