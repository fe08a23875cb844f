//! # Configuration Management
//!
//! Centralized configuration for the server engine.
//!
//! This module provides structured configuration for the listener, the
//! adaptive buffer heuristic, and the optional connection handshake.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Default receive buffer size in bytes; also the floor below which a
/// connection's buffer never shrinks.
pub const DEFAULT_RECV_BUFFER: usize = 8192;

/// Weight of the previous average in the sliding-window update.
pub const DEFAULT_AVG_WEIGHT_PREV: f64 = 0.85;

/// Weight of the newest message body size in the sliding-window update.
pub const DEFAULT_AVG_WEIGHT_SAMPLE: f64 = 0.15;

/// A buffer shrinks only once the average falls below capacity divided by
/// this ratio.
pub const DEFAULT_SHRINK_RATIO: f64 = 2.0;

/// Max allowed message body size (16 MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Main engine configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EngineConfig {
    /// Listener configuration
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Adaptive receive-buffer configuration
    #[serde(default)]
    pub buffers: BufferConfig,

    /// Connection handshake configuration
    #[serde(default)]
    pub handshake: HandshakeConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| EngineError::Config(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| EngineError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("FRAMELINK_HOST") {
            config.listener.host = host;
        }

        if let Ok(size) = std::env::var("FRAMELINK_RECV_BUFFER") {
            if let Ok(val) = size.parse::<usize>() {
                config.buffers.default_recv_buffer = val;
            }
        }

        if let Ok(size) = std::env::var("FRAMELINK_MAX_MESSAGE_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                config.buffers.max_message_size = val;
            }
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

    /// Validate the configuration for common issues and misconfigurations.
    ///
    /// Returns a list of validation errors. Empty list means the
    /// configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.listener.validate());
        errors.extend(self.buffers.validate());
        errors.extend(self.handshake.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenerConfig {
    /// Host to bind the listening socket to; the port is supplied to
    /// `Server::start`.
    pub host: String,

    /// Backlog passed to `listen`
    pub accept_backlog: u32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            accept_backlog: 1024,
        }
    }
}

impl ListenerConfig {
    /// Validate listener configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("Listener host cannot be empty".to_string());
        } else if format!("{}:0", self.host)
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            errors.push(format!(
                "Invalid listener host: '{}' (expected an IP address such as '0.0.0.0')",
                self.host
            ));
        }

        if self.accept_backlog == 0 {
            errors.push("Accept backlog must be greater than 0".to_string());
        }

        errors
    }
}

/// Adaptive receive-buffer configuration.
///
/// Each connection keeps an exponentially weighted moving average of its
/// message body sizes and resizes its receive buffer toward it:
/// `avg = avg_weight_prev * avg + avg_weight_sample * last_body_size`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BufferConfig {
    /// Initial receive buffer size and the shrink floor, in bytes
    pub default_recv_buffer: usize,

    /// Weight of the previous average (alpha)
    pub avg_weight_prev: f64,

    /// Weight of the newest sample (beta)
    pub avg_weight_sample: f64,

    /// Shrink threshold ratio: the buffer is reallocated down once the
    /// average drops below capacity divided by this ratio
    pub shrink_ratio: f64,

    /// Maximum allowed message body size in bytes
    pub max_message_size: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            default_recv_buffer: DEFAULT_RECV_BUFFER,
            avg_weight_prev: DEFAULT_AVG_WEIGHT_PREV,
            avg_weight_sample: DEFAULT_AVG_WEIGHT_SAMPLE,
            shrink_ratio: DEFAULT_SHRINK_RATIO,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl BufferConfig {
    /// Validate buffer configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.default_recv_buffer == 0 {
            errors.push("Default receive buffer size cannot be 0".to_string());
        }

        if self.max_message_size == 0 {
            errors.push("Max message size cannot be 0".to_string());
        } else if self.max_message_size > u32::MAX as usize {
            errors.push(format!(
                "Max message size too large for a 4-byte length prefix: {} bytes",
                self.max_message_size
            ));
        }

        if self.avg_weight_prev < 0.0 || self.avg_weight_sample < 0.0 {
            errors.push("Sliding-window weights must be non-negative".to_string());
        } else {
            let sum = self.avg_weight_prev + self.avg_weight_sample;
            if (sum - 1.0).abs() > 1e-6 {
                errors.push(format!(
                    "Sliding-window weights must sum to 1.0 (got {sum})"
                ));
            }
        }

        if self.shrink_ratio <= 1.0 {
            errors.push(format!(
                "Shrink ratio must be greater than 1.0 (got {})",
                self.shrink_ratio
            ));
        }

        errors
    }
}

/// Connection handshake configuration.
///
/// When required, every new connection must send the configured token as its
/// first message body; the engine echoes the token back and only then starts
/// dispatching messages. The token content is opaque to the engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HandshakeConfig {
    /// Whether new connections must complete the handshake exchange
    pub required: bool,

    /// Literal handshake token
    pub token: Vec<u8>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            required: false,
            token: b"FRAMELINK".to_vec(),
        }
    }
}

impl HandshakeConfig {
    /// Validate handshake configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.required && self.token.is_empty() {
            errors.push("Handshake token cannot be empty when the handshake is required".to_string());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_empty());
    }

    #[test]
    fn rejects_bad_weights() {
        let config = EngineConfig::default_with_overrides(|c| {
            c.buffers.avg_weight_prev = 0.9;
            c.buffers.avg_weight_sample = 0.9;
        });
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("sum to 1.0")));
    }

    #[test]
    fn rejects_degenerate_shrink_ratio() {
        let config = EngineConfig::default_with_overrides(|c| {
            c.buffers.shrink_ratio = 1.0;
        });
        assert!(config.validate_strict().is_err());
    }

    #[test]
    fn rejects_empty_required_token() {
        let config = EngineConfig::default_with_overrides(|c| {
            c.handshake.required = true;
            c.handshake.token.clear();
        });
        assert!(!config.validate().is_empty());
    }

    #[test]
    fn parses_toml() {
        let config = EngineConfig::from_toml(
            r#"
            [listener]
            host = "0.0.0.0"
            accept_backlog = 128

            [buffers]
            default_recv_buffer = 4096
            avg_weight_prev = 0.75
            avg_weight_sample = 0.25
            shrink_ratio = 2.0
            max_message_size = 1048576

            [handshake]
            required = true
            token = [70, 76]
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.host, "0.0.0.0");
        assert_eq!(config.buffers.default_recv_buffer, 4096);
        assert!(config.handshake.required);
        assert_eq!(config.handshake.token, vec![70, 76]);
        assert!(config.validate().is_empty());
    }
}
