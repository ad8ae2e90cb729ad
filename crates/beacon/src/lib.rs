//! Beacon - REST API gateway
//!
//! The `beacon` binary wires the workspace together: it reads the
//! configuration once, installs logging, picks the data store for the active
//! environment and serves the gateway until it receives SIGINT or SIGTERM.
//!
//! ```text
//!  client ──► body parsing ─► CORS ─► rate limit ─► query log ─► dispatch
//!                                                                   │
//!        ◄── access log ◄─ security headers ◄─ compression ◄────────┘
//! ```
//!
//! # Example Usage
//!
//! ```bash
//! # Development defaults: port 8082, in-memory store
//! $ beacon
//!
//! # Production against PostgreSQL
//! $ NODE_ENV=production DATABASE_URL=postgres://localhost/beacon beacon
//!
//! # With a configuration file
//! $ beacon --config /etc/beacon/beacon.toml
//! ```

#![doc(html_root_url = "https://docs.rs/beacon/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod bootstrap;
pub mod cli;
pub mod error;

pub use bootstrap::{connect_store, load_config, log_config, run, serve};
pub use cli::{Command, RunOptions};
pub use error::{GatewayError, GatewayResult};

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
