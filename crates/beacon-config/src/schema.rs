//! Configuration schema types.
//!
//! This module defines the structure of every configuration section.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Deployment environment the process runs in.
///
/// Drives the CORS origin and the database profile selection.
///
/// # Example
///
/// ```
/// use beacon_config::Environment;
///
/// let env: Environment = "production".parse().unwrap();
/// assert!(env.is_production());
/// assert_eq!(Environment::default(), Environment::Development);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development (the default).
    #[default]
    Development,
    /// Production deployment.
    Production,
    /// Automated test runs.
    Test,
}

impl Environment {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }

    /// Returns `true` for [`Environment::Production`].
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::invalid_value(
                "environment",
                format!("unknown environment '{other}', expected development, production or test"),
            )),
        }
    }
}

/// Server lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Interface to bind (the port lives at the top level).
    #[serde(default = "default_host")]
    pub host: String,

    /// Graceful shutdown drain timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ServerSettings {
    /// Returns the shutdown timeout as a [`Duration`].
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Connection settings for one database profile.
///
/// A profile without a `url` selects the in-memory store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DatabaseProfile {
    /// PostgreSQL connection URL.
    #[serde(default)]
    pub url: Option<String>,

    /// Upper bound on pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for the first connection at startup.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseProfile {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl DatabaseProfile {
    /// Returns the connect timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    5
}

/// Database profiles, one per [`Environment`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Profile used when running in development.
    #[serde(default)]
    pub development: DatabaseProfile,

    /// Profile used when running in production.
    #[serde(default)]
    pub production: DatabaseProfile,

    /// Profile used by the test environment.
    #[serde(default)]
    pub test: DatabaseProfile,
}

impl DatabaseConfig {
    /// Returns the profile for the given environment.
    #[must_use]
    pub fn profile(&self, environment: Environment) -> &DatabaseProfile {
        match environment {
            Environment::Development => &self.development,
            Environment::Production => &self.production,
            Environment::Test => &self.test,
        }
    }

    pub(crate) fn profile_mut(&mut self, environment: Environment) -> &mut DatabaseProfile {
        match environment {
            Environment::Development => &mut self.development,
            Environment::Production => &mut self.production,
            Environment::Test => &mut self.test,
        }
    }
}

/// Fixed-window rate limit settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSettings {
    /// Requests allowed per client per window.
    #[serde(default = "default_rate_limit_max")]
    pub max: u64,

    /// Window length in milliseconds.
    #[serde(default = "default_rate_limit_window_ms")]
    pub window_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max: default_rate_limit_max(),
            window_ms: default_rate_limit_window_ms(),
        }
    }
}

impl RateLimitSettings {
    /// Returns the window as a [`Duration`].
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

fn default_rate_limit_max() -> u64 {
    30
}

fn default_rate_limit_window_ms() -> u64 {
    60_000
}

/// Allowed CORS origin per environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CorsSettings {
    /// Origin allowed outside production; `*` allows any.
    #[serde(default = "default_open_origin")]
    pub development_origin: String,

    /// The single origin allowed in production.
    #[serde(default = "default_production_origin")]
    pub production_origin: String,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            development_origin: default_open_origin(),
            production_origin: default_production_origin(),
        }
    }
}

fn default_open_origin() -> String {
    "*".to_string()
}

fn default_production_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Request body parsing limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BodySettings {
    /// Largest accepted request body in bytes.
    #[serde(default = "default_body_limit")]
    pub limit_bytes: usize,
}

impl Default for BodySettings {
    fn default() -> Self {
        Self {
            limit_bytes: default_body_limit(),
        }
    }
}

fn default_body_limit() -> usize {
    100 * 1024
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Structured JSON lines.
    Json,
    /// Human-readable, optionally coloured.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "dev" => Ok(Self::Pretty),
            other => Err(ConfigError::invalid_value(
                "logging.format",
                format!("expected 'json' or 'pretty', got '{other}'"),
            )),
        }
    }
}

/// Logging settings.
///
/// Unset fields are derived from the [`Environment`] when logging starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Default level filter (`trace`, `debug`, `info`, `warn`, `error`).
    #[serde(default)]
    pub level: Option<String>,

    /// Output format.
    #[serde(default)]
    pub format: Option<LogFormat>,

    /// Colour the access log status codes.
    #[serde(default)]
    pub colorize: Option<bool>,
}

pub(crate) const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
