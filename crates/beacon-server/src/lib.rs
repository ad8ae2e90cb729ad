//! # Beacon Server
//!
//! The HTTP side of the Beacon gateway.
//!
//! This crate provides:
//!
//! - [`App`]: the middleware pipeline plus prefix dispatch, usable with or
//!   without a socket
//! - [`ResourceHandler`]: CRUD over one table, mounted under `/api/users`,
//!   `/api/messages` and `/api/reviews`
//! - [`Server`]: the hyper accept loop with graceful shutdown
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use beacon_config::AppConfig;
//! use beacon_server::App;
//! use beacon_store::MemoryStore;
//!
//! let app = App::new(&AppConfig::default(), Arc::new(MemoryStore::new()));
//! assert_eq!(app.dispatcher().router().mount_count(), 3);
//! ```

#![doc(html_root_url = "https://docs.rs/beacon-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
pub mod config;
pub mod error;
pub mod resource;
pub mod router;
pub mod server;
pub mod shutdown;

pub use app::{build_pipeline, App, Dispatcher, MOUNTS, ROOT_USER};
pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::ServerError;
pub use resource::{store_error_response, ResourceHandler};
pub use router::{ResourcePath, RouteMatch, Router};
pub use server::{BoundServer, Server};
pub use shutdown::{ConnectionTracker, ShutdownSignal};
