//! Configuration model for langbridge

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// langbridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub requests: RequestSettings,

    /// Per-language overrides, keyed by language id. An id without a
    /// built-in adapter registers an extra JSON-RPC backend.
    #[serde(default)]
    pub servers: BTreeMap<String, ServerOverride>,
}

/// Request timing shared by every backend unless overridden
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSettings {
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "defaults::initialize_timeout_ms")]
    pub initialize_timeout_ms: u64,

    #[serde(default = "defaults::shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::timeout_ms(),
            initialize_timeout_ms: defaults::initialize_timeout_ms(),
            shutdown_grace_ms: defaults::shutdown_grace_ms(),
        }
    }
}

/// Override for one language backend
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerOverride {
    /// Executable path or name; replaces executable resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Spawn arguments; replaces the built-in arguments when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Passed verbatim as `initializationOptions`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialization_options: Option<Value>,
}

/// Timing applied to one backend process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSettings {
    pub request_timeout: Duration,
    pub initialize_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self::from(&RequestSettings::default())
    }
}

impl From<&RequestSettings> for ProcessSettings {
    fn from(settings: &RequestSettings) -> Self {
        Self {
            request_timeout: Duration::from_millis(settings.timeout_ms),
            initialize_timeout: Duration::from_millis(settings.initialize_timeout_ms),
            shutdown_grace: Duration::from_millis(settings.shutdown_grace_ms),
        }
    }
}

impl BridgeConfig {
    pub fn server(&self, language: &str) -> Option<&ServerOverride> {
        self.servers.get(language)
    }

    /// Timing for a language, honoring its `timeout_ms` override
    pub fn process_settings(&self, language: &str) -> ProcessSettings {
        let mut settings = ProcessSettings::from(&self.requests);
        if let Some(ms) = self.server(language).and_then(|s| s.timeout_ms) {
            settings.request_timeout = Duration::from_millis(ms);
        }
        settings
    }
}

mod defaults {
    pub fn timeout_ms() -> u64 {
        4500
    }
    pub fn initialize_timeout_ms() -> u64 {
        10_000
    }
    pub fn shutdown_grace_ms() -> u64 {
        2000
    }
}
