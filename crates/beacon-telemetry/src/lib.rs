//! Observability for Beacon.
//!
//! - **Logging**: `tracing-subscriber` setup, JSON in production and
//!   human-readable in development ([`logging`])
//! - **Query log**: per-request collection of the SQL statements a request
//!   caused ([`query`])
//!
//! # Example
//!
//! ```rust,ignore
//! use beacon_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::production())?;
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod query;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig};
pub use query::{QueryEvent, QueryLog, QueryTimer};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
