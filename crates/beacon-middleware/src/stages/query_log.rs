//! Per-request query logging.
//!
//! Opens a [`QueryLog`] scope around the rest of the chain. Every statement
//! the data store runs while the handler is executing lands in that scope;
//! once the response is ready each one is logged with the request id,
//! whatever the status.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use beacon_telemetry::query::{self, QueryLog};

/// The queries recorded for one request, stored in the context extensions
/// after the handler returns.
#[derive(Debug, Clone)]
pub struct RecordedQueries(pub QueryLog);

/// Query logging stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryLogMiddleware;

impl QueryLogMiddleware {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for QueryLogMiddleware {
    fn name(&self) -> &'static str {
        "query_log"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let log = QueryLog::new();
            let response = query::scope(log.clone(), next.run(ctx, request)).await;

            let request_id = ctx.request_id();
            for (index, event) in log.events().iter().enumerate() {
                tracing::info!(
                    target: "beacon::query",
                    %request_id,
                    index,
                    duration_ms = event.duration_ms(),
                    rows = event.rows,
                    failed = event.failed,
                    bindings = ?event.bindings,
                    "{}",
                    event.sql
                );
            }

            ctx.set_extension(RecordedQueries(log));
            response
        })
    }
}
