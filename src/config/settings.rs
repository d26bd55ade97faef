//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Protocol server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Shutdown deadlines.
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "server.name must not be empty".to_string(),
            });
        }

        if self.shutdown.grace_period_ms == 0 {
            return Err(ConfigError::ValidationError {
                message: "shutdown.grace_period_ms must be greater than zero".to_string(),
            });
        }

        if self.shutdown.hard_timeout_ms <= self.shutdown.grace_period_ms {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "shutdown.hard_timeout_ms ({}) must exceed shutdown.grace_period_ms ({})",
                    self.shutdown.hard_timeout_ms, self.shutdown.grace_period_ms
                ),
            });
        }

        Ok(())
    }
}

/// Protocol server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Name reported in `serverInfo` during the handshake.
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Emit a `notifications/initialized` line before reading any input.
    #[serde(default)]
    pub announce_ready: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            announce_ready: false,
        }
    }
}

fn default_server_name() -> String {
    crate::mcp::protocol::SERVER_NAME.to_string()
}

/// Shutdown deadline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShutdownConfig {
    /// How long in-flight tool calls may keep running once shutdown starts.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Deadline after which the process is terminated unconditionally.
    #[serde(default = "default_hard_timeout_ms")]
    pub hard_timeout_ms: u64,
}

impl ShutdownConfig {
    /// Grace period as a [`Duration`].
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Hard timeout as a [`Duration`].
    #[must_use]
    pub const fn hard_timeout(&self) -> Duration {
        Duration::from_millis(self.hard_timeout_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            hard_timeout_ms: default_hard_timeout_ms(),
        }
    }
}

const fn default_grace_period_ms() -> u64 {
    3_000
}

const fn default_hard_timeout_ms() -> u64 {
    10_000
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
