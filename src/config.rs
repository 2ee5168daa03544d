//! Configuration loading
//!
//! `$XDG_CONFIG_HOME/langbridge/config.toml` (or `--config <path>`), then
//! `LANGBRIDGE_*` environment overrides.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::models::BridgeConfig;

pub const ENV_REQUEST_TIMEOUT: &str = "LANGBRIDGE_REQUEST_TIMEOUT_MS";
pub const ENV_SHUTDOWN_GRACE: &str = "LANGBRIDGE_SHUTDOWN_GRACE_MS";

pub fn global_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("langbridge")
        .join("config.toml")
}

/// Load the effective configuration
///
/// A missing global file yields the defaults; a missing explicit file is an
/// error.
pub async fn load(explicit: Option<&Path>) -> Result<BridgeConfig, ConfigError> {
    let config = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::InvalidValue {
                    key: "config".to_string(),
                    message: format!("Config file does not exist: {}", path.display()),
                });
            }
            load_from_path(path).await?
        }
        None => load_from_path(&global_config_path()).await?,
    };

    let config = apply_env_overrides(config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

pub async fn load_from_path(path: &Path) -> Result<BridgeConfig, ConfigError> {
    if !path.exists() {
        return Ok(BridgeConfig::default());
    }
    let content = tokio::fs::read_to_string(path).await?;
    tracing::debug!("Loaded config from {}", path.display());
    toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
}

pub fn apply_env_overrides(
    mut config: BridgeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<BridgeConfig, ConfigError> {
    if let Some(val) = lookup(ENV_REQUEST_TIMEOUT) {
        config.requests.timeout_ms = parse_millis(ENV_REQUEST_TIMEOUT, &val)?;
    }
    if let Some(val) = lookup(ENV_SHUTDOWN_GRACE) {
        config.requests.shutdown_grace_ms = parse_millis(ENV_SHUTDOWN_GRACE, &val)?;
    }
    Ok(config)
}

fn parse_millis(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected milliseconds, got {:?}", value),
    })
}

/// Zero timeouts would fail every request immediately
pub fn validate(config: &BridgeConfig) -> Result<(), ConfigError> {
    let zero = |key: &str| ConfigError::InvalidValue {
        key: key.to_string(),
        message: "must be greater than zero".to_string(),
    };

    if config.requests.timeout_ms == 0 {
        return Err(zero("requests.timeout_ms"));
    }
    if config.requests.initialize_timeout_ms == 0 {
        return Err(zero("requests.initialize_timeout_ms"));
    }
    for (id, server) in &config.servers {
        if server.timeout_ms == Some(0) {
            return Err(zero(&format!("servers.{}.timeout_ms", id)));
        }
    }
    Ok(())
}
