//! Configuration resolution for qstream.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/qstream/settings.json)
//! 3. Project config (.qstream/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Complete qstream configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub connection: ConnectionSettings,
}

/// Per-turn streaming behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Outbound frames buffered before the pump waits for the transport.
    pub outbound_capacity: usize,
    /// Inbound frames buffered before the transport waits for the collector.
    pub inbound_capacity: usize,
    /// How long the pump may keep flushing end-of-input after the backend
    /// has already finished the turn.
    pub end_of_input_grace_ms: u64,
    /// Upper bound on a whole turn. `None` waits indefinitely.
    pub turn_timeout_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 32,
            inbound_capacity: 128,
            end_of_input_grace_ms: 2_000,
            turn_timeout_secs: None,
        }
    }
}

impl SessionConfig {
    pub const fn end_of_input_grace(&self) -> Duration {
        Duration::from_millis(self.end_of_input_grace_ms)
    }

    pub fn turn_timeout(&self) -> Option<Duration> {
        self.turn_timeout_secs.map(Duration::from_secs)
    }
}

/// Backend endpoint settings used by network transports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionSettings {
    pub endpoint: String,
    pub connect_timeout_secs: u64,
    /// Bearer token forwarded as-is; obtaining it is the caller's business.
    pub auth_token: Option<String>,
    /// Custom CA certificate for `https://` endpoints.
    pub ca_cert: Option<PathBuf>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:50051".to_string(),
            connect_timeout_secs: 5,
            auth_token: None,
            ca_cert: None,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut files = Vec::new();
    if let Some(global_path) = global_config_path() {
        files.push(global_path);
    }
    if let Some(dir) = project_dir {
        files.push(dir.join(".qstream").join("settings.json"));
    }

    let mut config = load_config_files(&files)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("qstream").join("settings.json"))
}

/// Merge the given settings files in order; missing files are skipped.
pub fn load_config_files(paths: &[PathBuf]) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;
    for path in paths {
        if path.exists() {
            merge_values(&mut merged, load_config_file(path)?);
        }
    }
    serde_json::from_value(merged).map_err(|e| Error::Config(format!("Invalid settings: {e}")))
}

fn load_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Deep-merge `overlay` into `base`: objects merge key by key, anything else
/// replaces.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_values(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `QSTREAM_*` overrides read through `lookup`.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("QSTREAM_ENDPOINT") {
        config.connection.endpoint = val;
    }
    if let Some(val) = lookup("QSTREAM_AUTH_TOKEN") {
        config.connection.auth_token = Some(val);
    }
    if let Some(n) = lookup("QSTREAM_CONNECT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.connection.connect_timeout_secs = n;
    }
    if let Some(n) = lookup("QSTREAM_TURN_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.session.turn_timeout_secs = Some(n);
    }
    if let Some(n) = lookup("QSTREAM_END_OF_INPUT_GRACE_MS").and_then(|v| v.parse().ok()) {
        config.session.end_of_input_grace_ms = n;
    }
}
