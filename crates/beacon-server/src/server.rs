//! HTTP server.
//!
//! A Tokio accept loop serving HTTP/1.1 with hyper. Each connection runs on
//! its own task; each request body is collected, up to the configured body
//! limit, before it enters the pipeline, and each request runs inside an `info` span carrying its id,
//! method, path and client address.
//!
//! On shutdown the listener stops accepting, every open connection is told
//! to finish its in-flight request and close, and the server waits for them
//! up to the configured timeout.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use beacon_config::AppConfig;
//! use beacon_server::{App, Server, ServerConfig};
//! use beacon_store::MemoryStore;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let app = App::new(&config, Arc::new(MemoryStore::new()));
//! Server::new(ServerConfig::from_app_config(&config)?, app).run().await?;
//! # Ok(())
//! # }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use beacon_middleware::stages::BodyError;
use beacon_middleware::{MiddlewareContext, Response};
use bytes::Bytes;
use http::Request;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tracing::Instrument;

use crate::app::App;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// The gateway HTTP server.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    app: Arc<App>,
}

impl Server {
    /// Creates a server for `app`.
    #[must_use]
    pub fn new(config: ServerConfig, app: App) -> Self {
        Self {
            config,
            app: Arc::new(app),
        }
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The application.
    #[must_use]
    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// Binds the listening socket.
    pub async fn bind(self) -> Result<BoundServer, ServerError> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        Ok(BoundServer {
            listener,
            local_addr,
            config: self.config,
            app: self.app,
        })
    }

    /// Serves until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Serves until `shutdown` is triggered.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        self.bind().await?.serve(shutdown).await
    }
}

/// A server whose socket is bound but not yet accepting.
#[derive(Debug)]
pub struct BoundServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    app: Arc<App>,
}

impl BoundServer {
    /// The bound address; differs from the configured one when port 0 was requested.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `shutdown` is triggered, then drains.
    pub async fn serve(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        tracing::info!("listening on port {}", self.local_addr.port());

        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        let app = Arc::clone(&self.app);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        let keep_alive = self.config.keep_alive();

                        tokio::spawn(async move {
                            if let Err(err) =
                                serve_connection(app, stream, remote_addr, keep_alive, shutdown).await
                            {
                                tracing::debug!(client = %remote_addr, error = %err, "connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "failed to accept connection");
                    }
                },
                () = shutdown.recv() => {
                    tracing::info!("shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        let timeout = self.config.shutdown_timeout();
        tracing::info!(
            active = tracker.active_connections(),
            timeout_secs = timeout.as_secs(),
            "draining connections"
        );

        if tokio::time::timeout(timeout, tracker.wait_idle()).await.is_err() {
            tracing::warn!(
                active = tracker.active_connections(),
                "shutdown timeout reached with connections still open"
            );
        }

        tracing::info!("server stopped");
        Ok(())
    }
}

async fn serve_connection(
    app: Arc<App>,
    stream: TcpStream,
    remote_addr: SocketAddr,
    keep_alive: bool,
    shutdown: ShutdownSignal,
) -> Result<(), hyper::Error> {
    let service = service_fn(move |request: Request<Incoming>| {
        let app = Arc::clone(&app);
        async move { Ok::<_, Infallible>(handle_request(&app, request, remote_addr).await) }
    });

    let conn = http1::Builder::new()
        .keep_alive(keep_alive)
        .serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    }
}

/// Collects the body and runs the request through the application.
///
/// A body over the limit is answered with 413 as soon as the limit is
/// crossed, without reading the rest.
async fn handle_request(app: &App, request: Request<Incoming>, remote_addr: SocketAddr) -> Response {
    let ctx = MiddlewareContext::new().with_client_addr(remote_addr);
    let span = tracing::info_span!(
        "request",
        request_id = %ctx.request_id(),
        method = %request.method(),
        path = %request.uri().path(),
        client = %remote_addr,
    );

    async move {
        let (parts, body) = request.into_parts();
        let limit = app.body_limit();

        match Limited::new(body, limit).collect().await {
            Ok(collected) => {
                let request = Request::from_parts(parts, Full::new(collected.to_bytes()));
                app.handle(ctx, request).await
            }
            Err(err) => {
                let error = if err.downcast_ref::<LengthLimitError>().is_some() {
                    BodyError::TooLarge { limit }
                } else {
                    BodyError::Unreadable(err.to_string())
                };
                tracing::warn!(error = %error, "request body rejected");
                app.reject(ctx, Request::from_parts(parts, Full::new(Bytes::new())), &error)
                    .await
            }
        }
    }
    .instrument(span)
    .await
}
