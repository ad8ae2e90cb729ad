//! Gateway middleware stages.
//!
//! Response wrappers, outermost first:
//!
//! - [`access_log`] - one log line per request with the final status
//! - [`security_headers`] - protective response headers
//! - [`compression`] - negotiated response compression
//!
//! Request stages, in execution order:
//!
//! - [`body_parser`] - JSON and URL-encoded body decoding
//! - [`cors`] - origin policy and preflights
//! - [`rate_limit`] - fixed-window per-client limit
//! - [`query_log`] - per-request database query log

pub mod access_log;
pub mod body_parser;
pub mod compression;
pub mod cors;
pub mod query_log;
pub mod rate_limit;
pub mod security_headers;

pub use access_log::{AccessLogMiddleware, StatusClass};
pub use body_parser::{BodyError, BodyParserConfig, BodyParserMiddleware};
pub use compression::{Algorithm, CompressionConfig, CompressionError, CompressionLevel, CompressionMiddleware};
pub use cors::{AllowedOrigins, CorsConfig, CorsMiddleware};
pub use query_log::{QueryLogMiddleware, RecordedQueries};
pub use rate_limit::{Decision, RateLimitConfig, RateLimitMiddleware, RateLimiter};
pub use security_headers::{SecurityHeadersConfig, SecurityHeadersMiddleware};
