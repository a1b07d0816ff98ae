//! Engine configuration.
//!
//! Configuration is loaded from a TOML file (default: `notelink.toml`);
//! every field has a default so an empty file is a valid configuration.

use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration for a sync engine instance.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Name this endpoint stamps into artifact provenance
    /// (default: "primary").
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Path of the durable queue file (default: `queue.json`).
    #[serde(default = "default_queue_path")]
    pub queue_path: PathBuf,
    /// Directory where received artifacts are written
    /// (default: `received`).
    #[serde(default = "default_received_dir")]
    pub received_dir: PathBuf,
    /// Accepted artifact file extension (default: "m4a").
    #[serde(default = "default_content_ext")]
    pub content_ext: String,
    /// Delay in milliseconds between the link coming up and the queue
    /// drain starting, letting the session settle (default: 1000).
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Seconds after which an inbound command is considered stale and
    /// discarded instead of dispatched (default: 30). Deferred commands
    /// can surface long after the issuing tap once the link returns.
    #[serde(default = "default_command_ttl_secs")]
    pub command_ttl_secs: u64,
}

// Default value functions
fn default_device_name() -> String {
    "primary".to_string()
}

fn default_queue_path() -> PathBuf {
    PathBuf::from("queue.json")
}

fn default_received_dir() -> PathBuf {
    PathBuf::from("received")
}

fn default_content_ext() -> String {
    "m4a".to_string()
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_command_ttl_secs() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            queue_path: default_queue_path(),
            received_dir: default_received_dir(),
            content_ext: default_content_ext(),
            settle_delay_ms: default_settle_delay_ms(),
            command_ttl_secs: default_command_ttl_secs(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
