//! Root configuration type.
//!
//! This module provides [`AppConfig`], the immutable settings object built once
//! at process entry and handed by reference to every component.

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::schema::LOG_LEVELS;
use crate::{
    BodySettings, ConfigError, CorsSettings, DatabaseConfig, DatabaseProfile, Environment,
    LoggingSettings, RateLimitSettings, ServerSettings,
};

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8082;

/// Complete gateway configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to build one from files and the
/// process environment.
///
/// # Example
///
/// ```
/// use beacon_config::{AppConfig, Environment};
///
/// let config = AppConfig::default();
/// assert_eq!(config.port, 8082);
/// assert_eq!(config.environment, Environment::Development);
/// assert_eq!(config.cors_origin(), "*");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment.
    #[serde(default)]
    pub environment: Environment,

    /// Server lifecycle settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Database profiles.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Rate limit policy.
    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    /// CORS origins.
    #[serde(default)]
    pub cors: CorsSettings,

    /// Body parser limits.
    #[serde(default)]
    pub body: BodySettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            environment: Environment::default(),
            server: ServerSettings::default(),
            database: DatabaseConfig::default(),
            rate_limit: RateLimitSettings::default(),
            cors: CorsSettings::default(),
            body: BodySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl AppConfig {
    /// Returns `true` when running in production.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment.is_production()
    }

    /// Returns the CORS origin for the configured environment.
    #[must_use]
    pub fn cors_origin(&self) -> &str {
        if self.is_production() {
            &self.cors.production_origin
        } else {
            &self.cors.development_origin
        }
    }

    /// Returns the database profile for the configured environment.
    #[must_use]
    pub fn database_profile(&self) -> &DatabaseProfile {
        self.database.profile(self.environment)
    }

    /// Returns the socket address to bind.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.server.host.parse().map_err(|_| {
            ConfigError::invalid_value(
                "server.host",
                format!("invalid IP address: {}", self.server.host),
            )
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The bind host is not an IP address
    /// - The rate limit window or maximum is zero
    /// - The body limit is zero
    /// - A CORS origin is empty
    /// - The active database URL is not a PostgreSQL URL
    /// - The log level is unknown
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.rate_limit.max == 0 {
            return Err(ConfigError::invalid_value(
                "rate_limit.max",
                "must be greater than zero",
            ));
        }

        if self.rate_limit.window_ms == 0 {
            return Err(ConfigError::invalid_value(
                "rate_limit.window_ms",
                "must be greater than zero",
            ));
        }

        if self.body.limit_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "body.limit_bytes",
                "must be greater than zero",
            ));
        }

        if self.cors_origin().trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "cors",
                format!("origin for {} must not be empty", self.environment),
            ));
        }

        if let Some(url) = &self.database_profile().url {
            if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                return Err(ConfigError::invalid_value(
                    format!("database.{}.url", self.environment),
                    "expected a postgres:// or postgresql:// URL",
                ));
            }
        }

        if let Some(level) = &self.logging.level {
            if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
                return Err(ConfigError::invalid_value(
                    "logging.level",
                    format!("unknown level '{level}'"),
                ));
            }
        }

        Ok(())
    }
}
