//! # Beacon Middleware
//!
//! The request pipeline of the Beacon gateway.
//!
//! Every request passes through the same stages before dispatch:
//!
//! | Stage | Middleware       | Purpose                                      |
//! |-------|------------------|----------------------------------------------|
//! | 1     | Body Parsing     | Decode JSON and URL-encoded bodies           |
//! | 2     | Compression      | Negotiate and compress the response          |
//! | 3     | Security Headers | Protective headers on every response         |
//! | 4     | CORS             | Origin policy, preflights                    |
//! | 5     | Rate Limiting    | Fixed-window limit per client address        |
//! | 6     | Access Logging   | One log line per request with final status   |
//! | 7     | Query Logging    | Collect the statements issued by the handler |
//!
//! Response-only stages (2, 3, 6) wrap the chain from the outside, so
//! rejections by the guards (body parsing, CORS, rate limiting) are still
//! logged and still carry security headers:
//!
//! ```text
//! AccessLog → SecurityHeaders → Compression → BodyParser → Cors → RateLimit → QueryLog → dispatch
//! ```
//!
//! ## Example
//!
//! ```
//! use beacon_middleware::pipeline::Stage;
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 7);
//! assert_eq!(stages[0].name(), "body_parser");
//! assert!(stages[1].wraps_response());
//! ```

#![doc(html_root_url = "https://docs.rs/beacon-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod middleware;
pub mod pipeline;
pub mod stages;
pub mod types;

pub use context::{MiddlewareContext, ParsedBody};
pub use middleware::{BoxFuture, Middleware, Next};
pub use pipeline::{Pipeline, PipelineBuilder, Stage};
pub use types::{Request, Response, ResponseExt};
