//! Configuration for resterx.
//!
//! Sources are layered in this order, later ones winning:
//!
//! 1. `config/default.toml`
//! 2. `config/{RUN_ENV}.toml` (`RUN_ENV` defaults to `debug`)
//! 3. `RESTERX__SECTION__KEY` environment variables
//! 4. legacy storage variables (`MONGODB_URI`, `MONGODB_DATABASE`, `SQLITE_PATH`)
//!
//! Values equal to `"secret_from_env"` are then resolved from
//! `RESTERX_SECRET_*` variables.

use config::{Config, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use std::env;
use std::path::PathBuf;
use tracing::debug;

pub mod env_vars;
pub mod models;

pub use models::*;

/// Loads the application configuration from files and the environment.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    ensure_dotenv_loaded();

    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| "debug".to_string());
    let config_dir = PathBuf::from(env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string()));

    let default_path = config_dir.join("default");
    let env_path = config_dir.join(&run_env);
    debug!(
        "Loading config from {} and {}",
        default_path.display(),
        env_path.display()
    );

    let builder = Config::builder()
        .add_source(File::with_name(&default_path.to_string_lossy()).required(false))
        .add_source(File::with_name(&env_path.to_string_lossy()).required(false))
        .add_source(
            Environment::with_prefix(&env_vars::get_config_prefix())
                .separator(env_vars::CONFIG_SEPARATOR)
                .try_parsing(true),
        );

    let raw: AppConfig = builder.build()?.try_deserialize()?;
    let mut config = resolve_secrets(raw)?;
    env_vars::apply_legacy_storage_env(&mut config);
    validate_config(&config)?;
    Ok(config)
}

/// Rejects settings the services cannot run safely with.
///
/// A JWT secret that is empty or still the `"secret_from_env"` marker would
/// let anyone mint room tokens.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    let secret = config.auth.jwt_secret.trim();
    if secret.is_empty() || secret == env_vars::SECRET_MARKER {
        return Err(ConfigError::Message(format!(
            "auth.jwt_secret is not set; export {} or {}",
            env_vars::secret_path_to_env_var("auth.jwt_secret"),
            env_vars::legacy_secret_path_to_env_var("auth.jwt_secret")
        )));
    }
    Ok(())
}

/// Replaces `"secret_from_env"` markers with their environment values.
pub fn resolve_secrets(config: AppConfig) -> Result<AppConfig, ConfigError> {
    let mut json = serde_json::to_value(&config)
        .map_err(|err| ConfigError::Message(format!("failed to serialize config: {err}")))?;
    env_vars::inject_env_secrets(&mut json);
    serde_json::from_value(json)
        .map_err(|err| ConfigError::Message(format!("failed to rebuild config: {err}")))
}

static INIT_DOTENV: OnceCell<()> = OnceCell::new();

/// Loads the dotenv file into the process environment once.
///
/// `DOTENV_OVERRIDE` selects the file; otherwise `.env` is used. Returns the
/// path that was tried.
pub fn ensure_dotenv_loaded() -> String {
    let dotenv_path = env::var("DOTENV_OVERRIDE").unwrap_or_else(|_| ".env".to_string());

    INIT_DOTENV.get_or_init(|| {
        dotenv::from_filename(&dotenv_path).ok();
    });

    dotenv_path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_files() {
        let config = AppConfig::default();
        assert_eq!(config.storage.sqlite_path, "resterx_storage.db");
        assert_eq!(config.storage.mongodb_database, "resterx");
        assert_eq!(config.storage.op_timeout_secs, 5);
        assert!(config.storage.mongodb_uri.is_none());
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_unresolved_jwt_secret_is_rejected() {
        let config = AppConfig::default();
        assert_eq!(config.auth.jwt_secret, env_vars::SECRET_MARKER);
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Message(_))
        ));

        let mut config = AppConfig::default();
        config.auth.jwt_secret = "   ".to_string();
        assert!(validate_config(&config).is_err());

        config.auth.jwt_secret = "a-real-signing-secret".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_partial_storage_section_fills_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "storage": { "sqlite_path": "/tmp/other.db" }
        }))
        .unwrap();
        assert_eq!(config.storage.sqlite_path, "/tmp/other.db");
        assert_eq!(config.storage.connect_timeout_secs, 10);
        assert_eq!(config.auth.token_ttl_secs, 86_400);
    }
}
