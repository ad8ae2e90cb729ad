//! # Beacon Test
//!
//! In-memory testing for the Beacon gateway. [`TestClient`] hands requests
//! straight to the assembled application, so every request runs the real
//! pipeline (body parsing, CORS, rate limiting, query logging, compression
//! and security headers) without binding a port.
//!
//! ## Example
//!
//! ```
//! use beacon_config::AppConfig;
//! use beacon_test::TestClient;
//! use http::StatusCode;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let client = TestClient::from_config(&AppConfig::default());
//!
//! client
//!     .post("/api/users")
//!     .json(&json!({"name": "Ada", "email": "ada@example.com"}))
//!     .send()
//!     .await
//!     .assert_status(StatusCode::CREATED);
//!
//! client
//!     .get("/api/users/1")
//!     .send()
//!     .await
//!     .assert_status(StatusCode::OK)
//!     .assert_json_field("name", &json!("Ada"));
//! # });
//! ```
//!
//! Rate-limit buckets are keyed by peer address. Use
//! [`TestClient::as_client`] to simulate a second caller against the same
//! application.

#![doc(html_root_url = "https://docs.rs/beacon-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;

pub use client::{TestClient, TestClientRequest, DEFAULT_CLIENT_ADDR};
pub use error::TestError;
pub use request::{TestRequest, TestRequestBuilder};
pub use response::{TestResponse, SECURITY_HEADERS};
