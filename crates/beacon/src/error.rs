//! Error types for the gateway binary.

use thiserror::Error;

use beacon_config::ConfigError;
use beacon_server::ServerError;
use beacon_store::StoreError;
use beacon_telemetry::TelemetryError;

/// Anything that stops the gateway from starting or serving.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Bad command line.
    #[error("Usage error: {0}")]
    Usage(String),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Logging could not be installed.
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// The data store is unreachable.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The server failed to bind or serve.
    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Result alias for gateway startup.
pub type GatewayResult<T> = Result<T, GatewayError>;
