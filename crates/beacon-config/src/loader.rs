//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, `.env`, and environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::{AppConfig, ConfigError, Environment, LogFormat};

/// Environment variables understood by the loader, applied in this order.
///
/// The environment name goes first so that `DATABASE_URL` lands on the
/// profile it selects.
const ENV_KEYS: [&str; 10] = [
    "NODE_ENV",
    "BEACON_ENV",
    "PORT",
    "HOST",
    "DATABASE_URL",
    "RATE_LIMIT_MAX",
    "RATE_LIMIT_WINDOW_MS",
    "SHUTDOWN_TIMEOUT_SECS",
    "LOG_LEVEL",
    "LOG_FORMAT",
];

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables (optionally seeded from `.env`)
///
/// # Example
///
/// ```no_run
/// use beacon_config::ConfigLoader;
///
/// # fn main() -> Result<(), beacon_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("beacon.toml")?
///     .with_dotenv()
///     .with_env()
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: AppConfig,
    overrides: Vec<(String, String)>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader seeded with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            overrides: Vec::new(),
        }
    }

    /// Load configuration from a file.
    ///
    /// Supports TOML (.toml) and JSON (.json); the extension picks the format.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file does not exist, cannot be read,
    /// fails to parse, or contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format (`toml` or `json`).
    ///
    /// # Example
    ///
    /// ```
    /// use beacon_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     port = 9000
    ///     [rate_limit]
    ///     max = 5
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.port, 9000);
    /// assert_eq!(config.rate_limit.max, 5);
    /// assert_eq!(config.rate_limit.window_ms, 60_000);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Load a `.env` file into the process environment, if present.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        // A missing .env file is not an error
        let _ = dotenvy::dotenv();
        self
    }

    /// Queue overrides from the process environment.
    #[must_use]
    pub fn with_env(self) -> Self {
        let vars = ENV_KEYS
            .iter()
            .filter_map(|key| env::var(key).ok().map(|value| ((*key).to_string(), value)));
        self.with_env_vars(vars)
    }

    /// Queue overrides from an explicit set of variables.
    ///
    /// Variables outside the recognised set are ignored. Empty values count
    /// as unset.
    #[must_use]
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.overrides
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Apply queued overrides, validate, and return the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override fails to parse or the final
    /// configuration is invalid.
    pub fn load(mut self) -> Result<AppConfig, ConfigError> {
        let overrides: HashMap<String, String> = std::mem::take(&mut self.overrides)
            .into_iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();

        for key in ENV_KEYS {
            if let Some(value) = overrides.get(key) {
                self.apply_env_var(key, value)?;
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    // Parse configuration file based on extension
    fn parse_file(content: &str, path: &Path) -> Result<AppConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    // Apply a single environment variable
    fn apply_env_var(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match key {
            "NODE_ENV" | "BEACON_ENV" => {
                self.config.environment = value
                    .parse::<Environment>()
                    .map_err(|e| ConfigError::env_parse_error(key, e.to_string()))?;
            }
            "PORT" => {
                self.config.port = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected a port number"))?;
            }
            "HOST" => {
                self.config.server.host = value.to_string();
            }
            "DATABASE_URL" => {
                let environment = self.config.environment;
                self.config.database.profile_mut(environment).url = Some(value.to_string());
            }
            "RATE_LIMIT_MAX" => {
                self.config.rate_limit.max = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }
            "RATE_LIMIT_WINDOW_MS" => {
                self.config.rate_limit.window_ms = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }
            "SHUTDOWN_TIMEOUT_SECS" => {
                self.config.server.shutdown_timeout_secs = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }
            "LOG_LEVEL" => {
                self.config.logging.level = Some(value.to_lowercase());
            }
            "LOG_FORMAT" => {
                self.config.logging.format = Some(
                    value
                        .parse::<LogFormat>()
                        .map_err(|_| ConfigError::env_parse_error(key, "expected 'json' or 'pretty'"))?,
                );
            }
            _ => {}
        }

        Ok(())
    }
}
