//! The assembled gateway application.
//!
//! [`App`] owns the middleware pipeline and the dispatcher. The accept loop
//! hands it fully collected requests; in-process test clients call
//! [`App::handle`] directly without a socket.

use std::sync::Arc;

use beacon_config::AppConfig;
use beacon_middleware::stages::{
    AccessLogMiddleware, BodyError, BodyParserConfig, BodyParserMiddleware, CompressionMiddleware, CorsConfig,
    CorsMiddleware, QueryLogMiddleware, RateLimitConfig, RateLimitMiddleware,
    SecurityHeadersMiddleware,
};
use beacon_middleware::{MiddlewareContext, ParsedBody, Pipeline, Request, Response, ResponseExt};
use beacon_store::{DataStore, TableSchema, MESSAGES, REVIEWS, USERS};
use http::{header, HeaderValue, Method, StatusCode};
use serde_json::json;

use crate::resource::ResourceHandler;
use crate::router::Router;

/// Identification payload served at `GET /`.
pub const ROOT_USER: &str = "Lighthouse Labs";

/// Resource tables and the prefixes they are mounted under.
pub const MOUNTS: [(&str, &TableSchema); 3] = [
    ("/api/users", &USERS),
    ("/api/messages", &MESSAGES),
    ("/api/reviews", &REVIEWS),
];

/// Builds the gateway pipeline from configuration.
///
/// Response wrappers first (access log, security headers, compression),
/// then the request stages in order: body parsing, CORS, rate limiting,
/// query logging.
#[must_use]
pub fn build_pipeline(config: &AppConfig) -> Pipeline {
    let colorize = config
        .logging
        .colorize
        .unwrap_or(!config.is_production());

    Pipeline::builder()
        .wrap_response(AccessLogMiddleware::new(colorize))
        .wrap_response(SecurityHeadersMiddleware::default())
        .wrap_response(CompressionMiddleware::default())
        .add_request_stage(BodyParserMiddleware::new(BodyParserConfig {
            limit_bytes: config.body.limit_bytes,
        }))
        .add_request_stage(CorsMiddleware::new(CorsConfig::from_origin(
            config.cors_origin(),
        )))
        .add_request_stage(RateLimitMiddleware::new(RateLimitConfig {
            max: config.rate_limit.max,
            window: config.rate_limit.window(),
            ..RateLimitConfig::default()
        }))
        .add_request_stage(QueryLogMiddleware::new())
        .build()
}

/// Routes a request that made it through the pipeline.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    router: Arc<Router<ResourceHandler>>,
}

impl Dispatcher {
    /// Mounts one resource handler per table over `store`.
    #[must_use]
    pub fn new(store: &Arc<dyn DataStore>) -> Self {
        let mut router = Router::new();
        for (prefix, schema) in MOUNTS {
            router.mount(prefix, ResourceHandler::new(schema, Arc::clone(store)));
        }
        Self {
            router: Arc::new(router),
        }
    }

    /// The prefix router.
    #[must_use]
    pub fn router(&self) -> &Router<ResourceHandler> {
        &self.router
    }

    /// Dispatches by path: the root endpoint, a mounted resource, or 404.
    pub async fn dispatch(&self, method: &Method, path: &str, body: ParsedBody) -> Response {
        if path == "/" {
            return root(method);
        }

        match self.router.resolve(path) {
            Some(matched) => {
                matched
                    .target()
                    .handle(method, matched.resource_path(), body)
                    .await
            }
            None => Response::json_error(
                StatusCode::NOT_FOUND,
                "not_found",
                &format!("no route for {path}"),
            ),
        }
    }
}

fn root(method: &Method) -> Response {
    match *method {
        Method::GET | Method::HEAD => Response::json(StatusCode::OK, &json!({ "user": ROOT_USER })),
        _ => {
            let mut response = Response::json_error(
                StatusCode::METHOD_NOT_ALLOWED,
                "method_not_allowed",
                "method not allowed",
            );
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
            response
        }
    }
}

/// Pipeline plus dispatcher.
#[derive(Debug)]
pub struct App {
    pipeline: Pipeline,
    dispatcher: Dispatcher,
    store: Arc<dyn DataStore>,
    body_limit: usize,
}

impl App {
    /// Assembles the application from configuration.
    #[must_use]
    pub fn new(config: &AppConfig, store: Arc<dyn DataStore>) -> Self {
        Self::with_pipeline(build_pipeline(config), store).with_body_limit(config.body.limit_bytes)
    }

    /// Assembles the application around a custom pipeline.
    #[must_use]
    pub fn with_pipeline(pipeline: Pipeline, store: Arc<dyn DataStore>) -> Self {
        Self {
            pipeline,
            dispatcher: Dispatcher::new(&store),
            store,
            body_limit: BodyParserConfig::default().limit_bytes,
        }
    }

    /// Sets the largest request body the server will read.
    #[must_use]
    pub fn with_body_limit(mut self, limit_bytes: usize) -> Self {
        self.body_limit = limit_bytes;
        self
    }

    /// Largest request body read from the wire, in bytes.
    #[must_use]
    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    /// The middleware pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The data store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    /// Runs one request through the pipeline and dispatch.
    pub async fn handle(&self, ctx: MiddlewareContext, request: Request) -> Response {
        let dispatcher = self.dispatcher.clone();
        self.pipeline
            .process(ctx, request, move |ctx, request| {
                let body = ctx.take_body();
                Box::pin(async move {
                    dispatcher
                        .dispatch(request.method(), request.uri().path(), body)
                        .await
                })
            })
            .await
    }

    /// Answers a request whose body could not be read.
    ///
    /// Only the response wrappers run: the rejection is logged and carries
    /// the security headers, but the request is neither counted nor dispatched.
    pub async fn reject(&self, ctx: MiddlewareContext, request: Request, error: &BodyError) -> Response {
        self.pipeline
            .respond(ctx, request, error.to_response())
            .await
    }
}
