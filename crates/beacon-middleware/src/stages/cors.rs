//! CORS policy.
//!
//! The allowed origin is fixed when the pipeline is built. With
//! [`AllowedOrigins::Any`] every response is marked `*` and preflights are
//! answered directly. With [`AllowedOrigins::List`] a request whose `Origin`
//! is not listed is rejected with `403` before it reaches the rate limiter or
//! the handler; listed origins are echoed back with `Vary: Origin`.
//!
//! Requests without an `Origin` header are same-origin and always pass.
//!
//! ## Example
//!
//! ```
//! use beacon_middleware::stages::{AllowedOrigins, CorsConfig, CorsMiddleware};
//!
//! let dev = CorsMiddleware::new(CorsConfig::from_origin("*"));
//! let prod = CorsMiddleware::new(CorsConfig::from_origin("http://localhost:3000"));
//!
//! assert!(matches!(dev.config().origins, AllowedOrigins::Any));
//! assert!(prod.config().origins.allows("http://localhost:3000"));
//! assert!(!prod.config().origins.allows("http://evil.test"));
//! ```

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{append_vary, Request, Response, ResponseExt};
use http::{header, HeaderValue, Method, StatusCode};

/// Methods advertised on preflight responses.
pub const DEFAULT_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";

/// The set of origins a browser may call from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// Any origin (`*`).
    Any,
    /// Exactly these origins.
    List(Vec<String>),
}

impl AllowedOrigins {
    /// Returns true if `origin` may make cross-origin requests.
    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => origins.iter().any(|o| o == origin),
        }
    }
}

/// CORS settings.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins.
    pub origins: AllowedOrigins,
    /// Value of `Access-Control-Allow-Methods` on preflights.
    pub methods: String,
}

impl CorsConfig {
    /// Builds settings from a single configured origin; `*` means any.
    #[must_use]
    pub fn from_origin(origin: &str) -> Self {
        let origins = if origin.trim() == "*" {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(vec![origin.trim().to_string()])
        };
        Self {
            origins,
            ..Self::default()
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: AllowedOrigins::Any,
            methods: DEFAULT_METHODS.to_string(),
        }
    }
}

/// CORS stage.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    config: CorsConfig,
    methods: HeaderValue,
}

impl CorsMiddleware {
    /// Creates the stage.
    #[must_use]
    pub fn new(config: CorsConfig) -> Self {
        let methods = HeaderValue::from_str(&config.methods)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_METHODS));
        Self { config, methods }
    }

    /// Returns the settings.
    #[must_use]
    pub fn config(&self) -> &CorsConfig {
        &self.config
    }

    fn is_preflight(request: &Request) -> bool {
        request.method() == Method::OPTIONS
            && request
                .headers()
                .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
    }

    fn allow_origin(&self, response: &mut Response, origin: Option<&HeaderValue>) {
        match (&self.config.origins, origin) {
            (AllowedOrigins::Any, _) => {
                response.headers_mut().insert(
                    header::ACCESS_CONTROL_ALLOW_ORIGIN,
                    HeaderValue::from_static("*"),
                );
            }
            (AllowedOrigins::List(_), Some(origin)) => {
                response
                    .headers_mut()
                    .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
                append_vary(response, "Origin");
            }
            (AllowedOrigins::List(_), None) => {}
        }
    }

    fn preflight(&self, request: &Request, origin: &HeaderValue) -> Response {
        let mut response = Response::empty(StatusCode::NO_CONTENT);
        self.allow_origin(&mut response, Some(origin));

        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, self.methods.clone());

        if let Some(requested) = request.headers().get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
            append_vary(&mut response, "Access-Control-Request-Headers");
        }
        response
    }
}

impl Middleware for CorsMiddleware {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let Some(origin) = request.headers().get(header::ORIGIN).cloned() else {
                let mut response = next.run(ctx, request).await;
                self.allow_origin(&mut response, None);
                return response;
            };

            let allowed = origin
                .to_str()
                .is_ok_and(|value| self.config.origins.allows(value));
            if !allowed {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    origin = ?origin,
                    "cross-origin request denied"
                );
                let mut response = Response::json_error(
                    StatusCode::FORBIDDEN,
                    "cors_origin_denied",
                    "Origin is not allowed",
                );
                append_vary(&mut response, "Origin");
                return response;
            }

            if Self::is_preflight(&request) {
                return self.preflight(&request, &origin);
            }

            let mut response = next.run(ctx, request).await;
            self.allow_origin(&mut response, Some(&origin));
            response
        })
    }
}
