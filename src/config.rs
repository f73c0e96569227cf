//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::DEFAULT_BUFFER_CAPACITY;
use crate::transport::ReconnectPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Telemetry socket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_ws_url")]
    pub url: String,

    /// Reconnect ceiling; 0 disables reconnecting
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Base reconnect delay, multiplied by the attempt number
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Deadline for one connect attempt, handshake included
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_ws_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay() -> u64 {
    1000 // 1 second
}

fn default_connect_timeout() -> u64 {
    10_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: default_ws_url(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl TransportConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.reconnect_attempts,
            Duration::from_millis(self.reconnect_delay_ms),
        )
        .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
    }
}

/// Telemetry store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Data points kept per device
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

/// REST backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::parse(path)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_overrides(var);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::parse(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations or environment
    ///
    /// A file that fails to load is skipped; invalid environment overrides
    /// on the fallback path are an error.
    pub fn load_default() -> Result<Self, ConfigError> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("iotstudio").join("live.toml")),
            Some(PathBuf::from("./iotstudio-live.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Check values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.transport.url.as_str();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::Invalid {
                field: "transport.url",
                reason: format!("expected a ws:// or wss:// URL, got {:?}", url),
            });
        }
        if self.transport.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "transport.connect_timeout_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.store.buffer_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "store.buffer_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Transport overrides
        if let Some(url) = var("IOTSTUDIO_WS_URL") {
            self.transport.url = url;
        }
        if let Some(attempts) = var("IOTSTUDIO_RECONNECT_ATTEMPTS") {
            if let Ok(n) = attempts.parse() {
                self.transport.reconnect_attempts = n;
            }
        }
        if let Some(delay) = var("IOTSTUDIO_RECONNECT_DELAY_MS") {
            if let Ok(ms) = delay.parse() {
                self.transport.reconnect_delay_ms = ms;
            }
        }
        if let Some(timeout) = var("IOTSTUDIO_CONNECT_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.transport.connect_timeout_ms = ms;
            }
        }

        // Store overrides
        if let Some(capacity) = var("IOTSTUDIO_BUFFER_CAPACITY") {
            if let Ok(n) = capacity.parse() {
                self.store.buffer_capacity = n;
            }
        }

        // API overrides
        if let Some(url) = var("IOTSTUDIO_API_URL") {
            self.api.base_url = url;
        }

        // Logging overrides
        if let Some(level) = var("IOTSTUDIO_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("IOTSTUDIO_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# IoT Studio live telemetry configuration
#
# Environment variables override these settings:
# - IOTSTUDIO_WS_URL
# - IOTSTUDIO_RECONNECT_ATTEMPTS
# - IOTSTUDIO_RECONNECT_DELAY_MS
# - IOTSTUDIO_CONNECT_TIMEOUT_MS
# - IOTSTUDIO_BUFFER_CAPACITY
# - IOTSTUDIO_API_URL
# - IOTSTUDIO_LOG_LEVEL
# - IOTSTUDIO_LOG_FORMAT

[transport]
# Telemetry socket (ws:// or wss://)
url = "ws://localhost:8080/ws"

# Reconnect attempts before giving up (0 disables reconnecting)
reconnect_attempts = 5

# Base reconnect delay (ms); attempt n waits n times this
reconnect_delay_ms = 1000

# Give up on a connect attempt (handshake included) after this many ms
connect_timeout_ms = 10000

[store]
# Data points kept per device
buffer_capacity = 100

[api]
# REST backend base URL
base_url = "http://localhost:8080/api"

# Request timeout in seconds
request_timeout_secs = 30

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
