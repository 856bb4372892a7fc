//! Configuration loading for signal-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`).
//! Every section and field is optional.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding `server.allowed_origins` (comma-separated).
pub const ALLOWED_ORIGINS_ENV: &str = "SIGNAL_RELAY_ALLOWED_ORIGINS";

/// Environment variable overriding `server.bind_address`.
pub const BIND_ADDRESS_ENV: &str = "SIGNAL_RELAY_BIND";

/// Root configuration for signal-relay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Keepalive supervisor configuration.
    pub keepalive: KeepaliveConfig,
    /// HTTP endpoints configuration.
    pub http: HttpConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP/WebSocket listener (default: 0.0.0.0:8080).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Path of the upgrade endpoint (default: /ws).
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    /// Scheme-qualified origins allowed to open a relay connection,
    /// e.g. `https://app.example.com`. `"*"` allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Keepalive supervisor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct KeepaliveConfig {
    /// Seconds between probe cycles (default: 30).
    #[serde(default = "default_keepalive_interval")]
    pub interval_secs: u64,
    /// Seconds a connection has to acknowledge a ping (default: 10).
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_secs: u64,
    /// Probe every connection at once instead of one after another (default: false).
    #[serde(default)]
    pub concurrent_probes: bool,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Enable metrics endpoint (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_keepalive_interval() -> u64 {
    30
}

fn default_ack_timeout() -> u64 {
    10
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            ws_path: default_ws_path(),
            allowed_origins: Vec::new(),
        }
    }
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_keepalive_interval(),
            ack_timeout_secs: default_ack_timeout(),
            concurrent_probes: false,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl KeepaliveConfig {
    /// Probe cycle period.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Ping acknowledgment deadline.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }
}

impl Config {
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

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(ALLOWED_ORIGINS_ENV).ok().as_deref(),
            std::env::var(BIND_ADDRESS_ENV).ok().as_deref(),
        );
    }

    fn apply_overrides(&mut self, allowed_origins: Option<&str>, bind_address: Option<&str>) {
        if let Some(origins) = allowed_origins {
            self.server.allowed_origins = parse_origin_list(origins);
        }
        if let Some(bind) = bind_address.map(str::trim).filter(|b| !b.is_empty()) {
            self.server.bind_address = bind.to_string();
        }
    }

    /// Check values that deserialize fine but cannot run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let keepalive = &self.keepalive;
        if keepalive.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "keepalive.interval_secs must be > 0".to_string(),
            });
        }
        if keepalive.ack_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "keepalive.ack_timeout_secs must be > 0".to_string(),
            });
        }
        if keepalive.ack_timeout_secs >= keepalive.interval_secs {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "keepalive.ack_timeout_secs ({}) must be shorter than interval_secs ({})",
                    keepalive.ack_timeout_secs, keepalive.interval_secs
                ),
            });
        }
        if !self.server.ws_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                reason: format!("server.ws_path must start with '/': {}", self.server.ws_path),
            });
        }
        Ok(())
    }
}

/// Split a comma-separated origin list, dropping blanks.
pub fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
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
    /// A value parsed but is unusable.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}
