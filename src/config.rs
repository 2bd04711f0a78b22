//! # Configuration Management
//!
//! Centralized configuration for servers, clients, framing and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Environment variables via `from_env()` (`FRAME_LINK_*`)
//! - Direct instantiation with defaults
//!
//! Durations are expressed in milliseconds in every serialised form, and a
//! zero duration disables the corresponding deadline or keep-alive.
//!
//! ## Example
//! ```rust
//! use frame_link::config::NetworkConfig;
//!
//! let config = NetworkConfig::from_toml(r#"
//!     [client]
//!     address = "127.0.0.1:7000"
//!     relink_wait = 500
//!
//!     [framing]
//!     kind = "head_tail"
//!     head = [35, 35]
//!     tail = [36, 36]
//!     type_len = 0
//!     check = "sum"
//! "#).unwrap();
//!
//! assert!(config.validate().is_empty());
//! let protocol = config.framing.build().unwrap();
//! assert_eq!(protocol.min_frame_len(), 6);
//! ```

use crate::core::checksum::CheckKind;
use crate::core::fixed_head::{ByteOrder, FixedHeadProtocol, LengthWidth, DEFAULT_MAX_BODY_LEN};
use crate::core::head_tail::HeadTailProtocol;
use crate::core::protocol::{FramingProtocol, DEFAULT_HEAD};
use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default size of a connection's read buffer.
pub const DEFAULT_BUFFER_LEN: usize = 1024;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Wire framing configuration, shared by both sides
    #[serde(default)]
    pub framing: FramingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("FRAME_LINK_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(addr) = std::env::var("FRAME_LINK_CLIENT_ADDRESS") {
            config.client.address = addr;
        }

        if let Some(val) = env_millis("FRAME_LINK_ACCEPT_TIMEOUT_MS") {
            config.server.accept_timeout = val;
        }

        if let Some(val) = env_millis("FRAME_LINK_CONNECT_TIMEOUT_MS") {
            config.client.connect_timeout = val;
        }

        if let Some(val) = env_millis("FRAME_LINK_RELINK_WAIT_MS") {
            config.client.relink_wait = val;
        }

        if let Some(val) = env_millis("FRAME_LINK_KEEP_ALIVE_MS") {
            config.server.keep_alive = val;
            config.client.keep_alive = val;
        }

        if let Ok(len) = std::env::var("FRAME_LINK_BUFFER_LEN") {
            if let Ok(val) = len.parse::<usize>() {
                config.server.buffer_len = val;
                config.client.buffer_len = val;
            }
        }

        if let Ok(level) = std::env::var("FRAME_LINK_LOG_LEVEL") {
            config.logging.log_level = level
                .parse::<Level>()
                .map_err(|_| ProtocolError::ConfigError(format!("Invalid log level: {level}")))?;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.framing.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn validate_buffer_len(buffer_len: usize, errors: &mut Vec<String>) {
    if buffer_len == 0 {
        errors.push("Buffer length must be greater than 0".to_string());
    } else if buffer_len > DEFAULT_MAX_BODY_LEN {
        errors.push(format!(
            "Buffer length too large: {buffer_len} bytes (maximum: {DEFAULT_MAX_BODY_LEN})"
        ));
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:9000")
    pub address: String,

    /// Deadline for a single accept; 0 waits indefinitely
    #[serde(with = "duration_serde")]
    pub accept_timeout: Duration,

    /// TCP keep-alive period for accepted sockets; 0 disables
    #[serde(with = "duration_serde")]
    pub keep_alive: Duration,

    /// Read buffer size per connection
    pub buffer_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("0.0.0.0:9000"),
            accept_timeout: Duration::ZERO,
            keep_alive: timeout::KEEPALIVE_INTERVAL,
            buffer_len: DEFAULT_BUFFER_LEN,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:8080')",
                self.address
            ));
        }

        if !self.accept_timeout.is_zero() && self.accept_timeout.as_millis() < 10 {
            errors.push("Accept timeout too short (minimum: 10ms, or 0 to disable)".to_string());
        }

        validate_buffer_len(self.buffer_len, &mut errors);

        errors
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Target server address, `host:port`
    pub address: String,

    /// Timeout for a single dial
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Fixed wait before retrying a failed dial
    #[serde(with = "duration_serde")]
    pub relink_wait: Duration,

    /// TCP keep-alive period; 0 disables
    #[serde(with = "duration_serde")]
    pub keep_alive: Duration,

    /// Read buffer size
    pub buffer_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:9000"),
            connect_timeout: timeout::CONNECT_TIMEOUT,
            relink_wait: timeout::RELINK_WAIT,
            keep_alive: timeout::KEEPALIVE_INTERVAL,
            buffer_len: DEFAULT_BUFFER_LEN,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let valid_host_port = self
            .address
            .rsplit_once(':')
            .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
            .unwrap_or(false);
        if self.address.is_empty() {
            errors.push("Client address cannot be empty".to_string());
        } else if !valid_host_port {
            errors.push(format!(
                "Invalid client address format: '{}' (expected format: 'example.com:8080')",
                self.address
            ));
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connection timeout too short (minimum: 100ms)".to_string());
        }

        if self.relink_wait.as_millis() < 10 {
            errors.push("Relink wait too short (minimum: 10ms)".to_string());
        } else if self.relink_wait.as_secs() > 300 {
            errors.push("Relink wait too long (maximum: 300s)".to_string());
        }

        validate_buffer_len(self.buffer_len, &mut errors);

        errors
    }
}

/// Which framing strategy to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingKind {
    #[default]
    FixedHead,
    HeadTail,
}

/// Framing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FramingConfig {
    pub kind: FramingKind,

    /// Head marker bytes
    pub head: Vec<u8>,

    /// Tail marker bytes (head/tail framing only)
    pub tail: Vec<u8>,

    /// Width of the type tag in bytes
    pub type_len: usize,

    /// Length field width (fixed-head framing only)
    pub length_width: LengthWidth,

    /// Length field byte order (fixed-head framing only)
    pub byte_order: ByteOrder,

    /// Trailing integrity check
    pub check: CheckKind,

    /// Largest body accepted from a length field (fixed-head framing only)
    pub max_body_len: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            kind: FramingKind::FixedHead,
            head: DEFAULT_HEAD.to_vec(),
            tail: Vec::new(),
            type_len: 1,
            length_width: LengthWidth::U16,
            byte_order: ByteOrder::BigEndian,
            check: CheckKind::Crc16,
            max_body_len: DEFAULT_MAX_BODY_LEN,
        }
    }
}

impl FramingConfig {
    /// Validate framing configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        match self.kind {
            FramingKind::FixedHead => {
                if self.max_body_len == 0 {
                    errors.push("Max body length must be greater than 0".to_string());
                }
            }
            FramingKind::HeadTail => {
                if self.head.is_empty() {
                    errors.push("Head/tail framing requires a non-empty head".to_string());
                }
                if self.tail.is_empty() {
                    errors.push("Head/tail framing requires a non-empty tail".to_string());
                }
            }
        }

        if self.type_len > 64 {
            errors.push(format!(
                "Type tag too wide: {} bytes (maximum: 64)",
                self.type_len
            ));
        }

        errors
    }

    /// Build the framing protocol described by this configuration.
    pub fn build(&self) -> Result<FramingProtocol> {
        match self.kind {
            FramingKind::FixedHead => Ok(FixedHeadProtocol::new(
                self.head.clone(),
                self.type_len,
                self.length_width,
                self.byte_order,
                self.check,
            )
            .with_max_body_len(self.max_body_len)
            .into()),
            FramingKind::HeadTail => Ok(HeadTailProtocol::new(
                self.head.clone(),
                self.tail.clone(),
                self.type_len,
                self.check,
            )?
            .into()),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("frame-link"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
