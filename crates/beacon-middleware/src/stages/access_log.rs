//! Access logging.
//!
//! Emits one `tracing` event per request once the final response is known:
//!
//! ```text
//! GET /api/users/1 200 1.942 ms - 57
//! ```
//!
//! The event level follows the status class (5xx `error`, 4xx `warn`,
//! everything else `info`). With colour enabled the status code is wrapped
//! in ANSI escapes, red, yellow, cyan or plain by class.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use std::fmt::Write;
use std::time::Instant;

/// Coarse grouping of response statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 5xx.
    ServerError,
    /// 4xx.
    ClientError,
    /// 3xx.
    Redirect,
    /// Everything else.
    Other,
}

impl StatusClass {
    /// Classifies a status code.
    #[must_use]
    pub fn of(status: StatusCode) -> Self {
        if status.is_server_error() {
            Self::ServerError
        } else if status.is_client_error() {
            Self::ClientError
        } else if status.is_redirection() {
            Self::Redirect
        } else {
            Self::Other
        }
    }

    /// Label used in the `status_class` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
            Self::Redirect => "redirect",
            Self::Other => "other",
        }
    }

    const fn ansi(self) -> Option<&'static str> {
        match self {
            Self::ServerError => Some("31"),
            Self::ClientError => Some("33"),
            Self::Redirect => Some("36"),
            Self::Other => None,
        }
    }
}

/// Renders one access log line.
#[must_use]
pub fn format_line(
    method: &str,
    path: &str,
    status: StatusCode,
    elapsed_ms: f64,
    bytes: Option<u64>,
    colorize: bool,
) -> String {
    let mut line = format!("{method} {path} ");
    match StatusClass::of(status).ansi().filter(|_| colorize) {
        Some(code) => {
            let _ = write!(line, "\x1b[{code}m{}\x1b[0m", status.as_u16());
        }
        None => {
            let _ = write!(line, "{}", status.as_u16());
        }
    }
    let _ = write!(line, " {elapsed_ms:.3} ms - ");
    match bytes {
        Some(bytes) => {
            let _ = write!(line, "{bytes}");
        }
        None => line.push('-'),
    }
    line
}

/// Access log stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLogMiddleware {
    colorize: bool,
}

impl AccessLogMiddleware {
    /// Creates the stage; `colorize` adds ANSI colour to the status.
    #[must_use]
    pub fn new(colorize: bool) -> Self {
        Self { colorize }
    }
}

impl Middleware for AccessLogMiddleware {
    fn name(&self) -> &'static str {
        "access_log"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let started = Instant::now();
            let method = request.method().clone();
            let path = request
                .uri()
                .path_and_query()
                .map_or_else(|| request.uri().path().to_string(), ToString::to_string);

            let (parts, body) = next.run(ctx, request).await.into_parts();
            let body = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(never) => match never {},
            };

            let status = parts.status;
            let bytes = (!body.is_empty()).then(|| body.len() as u64);
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            let line = format_line(method.as_str(), &path, status, elapsed_ms, bytes, self.colorize);
            let class = StatusClass::of(status).as_str();
            let request_id = ctx.request_id();

            match StatusClass::of(status) {
                StatusClass::ServerError => {
                    tracing::error!(target: "beacon::access", %request_id, status_class = class, "{line}");
                }
                StatusClass::ClientError => {
                    tracing::warn!(target: "beacon::access", %request_id, status_class = class, "{line}");
                }
                StatusClass::Redirect | StatusClass::Other => {
                    tracing::info!(target: "beacon::access", %request_id, status_class = class, "{line}");
                }
            }

            Response::from_parts(parts, Full::new(body))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseExt;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tracing::field::{Field, Visit};
    use tracing::Level;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    #[derive(Debug)]
    struct Captured {
        level: Level,
        target: String,
        status_class: Option<String>,
        message: String,
    }

    #[derive(Default)]
    struct Fields {
        status_class: Option<String>,
        message: String,
    }

    impl Visit for Fields {
        fn record_str(&mut self, field: &Field, value: &str) {
            match field.name() {
                "status_class" => self.status_class = Some(value.to_string()),
                "message" => self.message = value.to_string(),
                _ => {}
            }
        }

        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.message = format!("{value:?}");
            }
        }
    }

    /// Collects every event emitted while installed.
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<Captured>>>);

    impl<S: tracing::Subscriber> Layer<S> for Capture {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let mut fields = Fields::default();
            event.record(&mut fields);
            self.0.lock().push(Captured {
                level: *event.metadata().level(),
                target: event.metadata().target().to_string(),
                status_class: fields.status_class,
                message: fields.message,
            });
        }
    }

    async fn log_status(status: StatusCode) -> Vec<Captured> {
        let capture = Capture::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

        let request = http::Request::builder()
            .uri("/api/messages")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let next = Next::handler(move |_ctx, _req| {
            Box::pin(async move { Response::json_error(status, "rejected", "rejected") })
        });
        AccessLogMiddleware::new(false)
            .process(&mut MiddlewareContext::new(), request, next)
            .await;

        let events = std::mem::take(&mut *capture.0.lock());
        events
    }

    #[test]
    fn test_status_class() {
        assert_eq!(StatusClass::of(StatusCode::INTERNAL_SERVER_ERROR), StatusClass::ServerError);
        assert_eq!(StatusClass::of(StatusCode::TOO_MANY_REQUESTS), StatusClass::ClientError);
        assert_eq!(StatusClass::of(StatusCode::MOVED_PERMANENTLY), StatusClass::Redirect);
        assert_eq!(StatusClass::of(StatusCode::OK), StatusClass::Other);
        assert_eq!(StatusClass::of(StatusCode::CONTINUE), StatusClass::Other);
    }

    #[test]
    fn test_plain_line() {
        let line = format_line("GET", "/api/users/1", StatusCode::OK, 1.9424, Some(57), false);
        assert_eq!(line, "GET /api/users/1 200 1.942 ms - 57");

        let line = format_line("DELETE", "/api/users/1", StatusCode::NO_CONTENT, 0.5, None, false);
        assert_eq!(line, "DELETE /api/users/1 204 0.500 ms - -");
    }

    #[test]
    fn test_colored_line() {
        let line = format_line("GET", "/x", StatusCode::NOT_FOUND, 1.0, Some(0), true);
        assert_eq!(line, "GET /x \x1b[33m404\x1b[0m 1.000 ms - 0");

        let line = format_line("GET", "/x", StatusCode::BAD_GATEWAY, 1.0, Some(0), true);
        assert!(line.contains("\x1b[31m502"));

        // 2xx stays plain even with colour on
        let line = format_line("GET", "/", StatusCode::OK, 1.0, Some(26), true);
        assert_eq!(line, "GET / 200 1.000 ms - 26");
    }

    #[tokio::test]
    async fn test_stage_passes_response_through() {
        let request = http::Request::builder()
            .uri("/api/messages?page=2")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let next = Next::handler(|_ctx, _req| {
            Box::pin(async { Response::json_error(StatusCode::NOT_FOUND, "not_found", "nope") })
        });

        let mut ctx = MiddlewareContext::new();
        let response = AccessLogMiddleware::new(true)
            .process(&mut ctx, request, next)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_guard_rejections_log_at_warn() {
        for status in [StatusCode::TOO_MANY_REQUESTS, StatusCode::FORBIDDEN] {
            let events = log_status(status).await;
            assert_eq!(events.len(), 1, "{events:?}");

            let event = &events[0];
            assert_eq!(event.level, Level::WARN);
            assert_eq!(event.target, "beacon::access");
            assert_eq!(event.status_class.as_deref(), Some("client_error"));
            assert!(
                event.message.starts_with(&format!("GET /api/messages {}", status.as_u16())),
                "{}",
                event.message
            );
        }
    }

    #[tokio::test]
    async fn test_event_level_follows_status_class() {
        let events = log_status(StatusCode::BAD_GATEWAY).await;
        assert_eq!(events[0].level, Level::ERROR);
        assert_eq!(events[0].status_class.as_deref(), Some("server_error"));

        let events = log_status(StatusCode::OK).await;
        assert_eq!(events[0].level, Level::INFO);
        assert_eq!(events[0].status_class.as_deref(), Some("other"));
    }
}
