//! Listener settings.
//!
//! [`ServerConfig`] is the plain-value slice of
//! [`AppConfig`](beacon_config::AppConfig) the accept loop needs.
//!
//! # Example
//!
//! ```rust
//! use beacon_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .addr("127.0.0.1:3000".parse().unwrap())
//!     .shutdown_timeout(Duration::from_secs(5))
//!     .build();
//!
//! assert_eq!(config.port(), 3000);
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use beacon_config::{AppConfig, ConfigError, DEFAULT_PORT};

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    addr: SocketAddr,

    /// How long in-flight connections may take to finish after shutdown starts
    shutdown_timeout: Duration,

    keep_alive: bool,
}

impl ServerConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Derives the listener settings from the application config.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self::builder()
            .addr(config.socket_addr()?)
            .shutdown_timeout(config.server.shutdown_timeout())
            .build())
    }

    /// Bind address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bind port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Graceful shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Whether HTTP/1.1 keep-alive is enabled.
    #[must_use]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfigBuilder::default().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    addr: SocketAddr,
    shutdown_timeout: Duration,
    keep_alive: bool,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            keep_alive: true,
        }
    }
}

impl ServerConfigBuilder {
    /// Sets the bind address. Port 0 picks a free port.
    #[must_use]
    pub fn addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Sets the graceful shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Enables or disables keep-alive.
    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            addr: self.addr,
            shutdown_timeout: self.shutdown_timeout,
            keep_alive: self.keep_alive,
        }
    }
}
