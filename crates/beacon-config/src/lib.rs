//! Typed configuration for Beacon.
//!
//! This crate builds the single [`AppConfig`] a Beacon process runs with:
//! - TOML and JSON configuration files
//! - `.env` files via `dotenvy`
//! - Environment variable overrides (`PORT`, `NODE_ENV`, `DATABASE_URL`, ...)
//! - Strict validation (fails on unknown fields and invalid values)
//!
//! The configuration is read once at startup and never mutated afterwards.
//! Components receive it, or plain-value sections of it, by reference.
//!
//! # Example
//!
//! ```no_run
//! use beacon_config::ConfigLoader;
//!
//! # fn main() -> Result<(), beacon_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("beacon.toml")?
//!     .with_dotenv()
//!     .with_env()
//!     .load()?;
//!
//! println!("listening on port {}", config.port);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! port = 8082
//! environment = "development"
//!
//! [server]
//! host = "0.0.0.0"
//! shutdown_timeout_secs = 30
//!
//! [database.production]
//! url = "postgres://beacon@db/beacon"
//! max_connections = 10
//!
//! [rate_limit]
//! max = 30
//! window_ms = 60000
//!
//! [cors]
//! production_origin = "http://localhost:3000"
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{AppConfig, DEFAULT_PORT};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{
    BodySettings, CorsSettings, DatabaseConfig, DatabaseProfile, Environment, LogFormat,
    LoggingSettings, RateLimitSettings, ServerSettings,
};
