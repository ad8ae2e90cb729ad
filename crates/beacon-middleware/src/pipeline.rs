//! Gateway middleware pipeline.
//!
//! Every request flows through the same seven stages before dispatch:
//!
//! 1. **Body Parsing** - decode JSON and URL-encoded bodies
//! 2. **Compression** - negotiate and compress the response
//! 3. **Security Headers** - protective response headers
//! 4. **CORS** - origin policy and preflight handling
//! 5. **Rate Limiting** - fixed-window per-client limit
//! 6. **Access Logging** - one log line per request
//! 7. **Query Logging** - collect the statements issued by the handler
//!
//! Stages that only touch the response (compression, security headers,
//! access logging) are registered as response wrappers and sit outside the
//! request guards. The guards then run in the numbered order above, so a
//! rejected request still gets logged and still carries security headers.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use std::sync::Arc;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The assembled middleware chain.
///
/// Immutable once built. Shared between connections behind an `Arc`.
///
/// # Example
///
/// ```
/// use beacon_middleware::pipeline::Pipeline;
/// use beacon_middleware::stages::{RateLimitConfig, RateLimitMiddleware, SecurityHeadersMiddleware};
///
/// let pipeline = Pipeline::builder()
///     .wrap_response(SecurityHeadersMiddleware::default())
///     .add_request_stage(RateLimitMiddleware::new(RateLimitConfig::default()))
///     .build();
///
/// assert_eq!(pipeline.stage_names(), vec!["security_headers", "rate_limit"]);
/// ```
pub struct Pipeline {
    /// Response wrappers, outermost first.
    response_stages: Vec<BoxedMiddleware>,

    /// Request guards and transformers, in execution order.
    request_stages: Vec<BoxedMiddleware>,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Processes a request through every stage, then the handler.
    pub async fn process<H>(
        &self,
        mut ctx: MiddlewareContext,
        request: Request,
        handler: H,
    ) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'static,
    {
        let next = self.build_chain(handler);
        next.run(&mut ctx, request).await
    }

    /// Runs only the response wrappers around an already decided `response`.
    ///
    /// For requests rejected before they could enter the pipeline, such as
    /// a body that could not be read. The rejection still gets its access
    /// log line and security headers, and no request stage runs.
    pub async fn respond(
        &self,
        mut ctx: MiddlewareContext,
        request: Request,
        response: Response,
    ) -> Response {
        let mut next = Next::handler(move |_ctx, _request| Box::pin(async move { response }));
        for middleware in self.response_stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }
        next.run(&mut ctx, request).await
    }

    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        let mut next = Next::handler(handler);

        for middleware in self.request_stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }

        for middleware in self.response_stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }

        next
    }

    /// Returns the stage names in the order a request meets them.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.response_stages
            .iter()
            .chain(&self.request_stages)
            .map(|mw| mw.name())
            .collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.response_stages.len() + self.request_stages.len()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Builder for constructing a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    response_stages: Vec<BoxedMiddleware>,
    request_stages: Vec<BoxedMiddleware>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a response wrapper.
    ///
    /// Wrappers run before every request stage; the first one added is the
    /// outermost and sees the final response last.
    #[must_use]
    pub fn wrap_response<M: Middleware>(mut self, middleware: M) -> Self {
        self.response_stages.push(Arc::new(middleware));
        self
    }

    /// Adds a request stage. Request stages run in insertion order.
    #[must_use]
    pub fn add_request_stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.request_stages.push(Arc::new(middleware));
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            response_stages: self.response_stages,
            request_stages: self.request_stages,
        }
    }
}

/// The gateway stages, numbered in their documented order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Stage 1: request body decoding
    BodyParsing = 1,
    /// Stage 2: response compression
    Compression = 2,
    /// Stage 3: protective response headers
    SecurityHeaders = 3,
    /// Stage 4: origin policy
    Cors = 4,
    /// Stage 5: per-client rate limit
    RateLimit = 5,
    /// Stage 6: access log line
    AccessLog = 6,
    /// Stage 7: per-request query log
    QueryLog = 7,
}

impl Stage {
    /// Returns true for stages that only act on the response.
    #[must_use]
    pub const fn wraps_response(self) -> bool {
        matches!(
            self,
            Self::Compression | Self::SecurityHeaders | Self::AccessLog
        )
    }

    /// Returns the stage name, as reported by its middleware.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BodyParsing => "body_parser",
            Self::Compression => "compression",
            Self::SecurityHeaders => "security_headers",
            Self::Cors => "cors",
            Self::RateLimit => "rate_limit",
            Self::AccessLog => "access_log",
            Self::QueryLog => "query_log",
        }
    }

    /// Returns all stages in documented order.
    #[must_use]
    pub const fn all() -> [Stage; 7] {
        [
            Self::BodyParsing,
            Self::Compression,
            Self::SecurityHeaders,
            Self::Cors,
            Self::RateLimit,
            Self::AccessLog,
            Self::QueryLog,
        ]
    }
}
