//! In-memory client for the gateway application.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use crate::error::TestError;
use crate::request::{TestRequest, TestRequestBuilder};
use crate::response::TestResponse;
use beacon_config::AppConfig;
use beacon_middleware::MiddlewareContext;
use beacon_server::App;
use beacon_store::{DataStore, MemoryStore};
use bytes::Bytes;
use http::Method;
use serde::Serialize;

/// Peer address requests appear to come from unless overridden.
pub const DEFAULT_CLIENT_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 40_000));

/// Sends requests through [`App::handle`] without a socket.
///
/// Every request runs the full pipeline, so the client shares rate-limit
/// buckets with any other client built from the same app via
/// [`as_client`](Self::as_client).
///
/// # Example
///
/// ```
/// use beacon_config::AppConfig;
/// use beacon_test::TestClient;
///
/// # tokio_test::block_on(async {
/// let client = TestClient::from_config(&AppConfig::default());
/// let response = client.get("/").send().await;
/// assert_eq!(response.status_code(), 200);
/// assert_eq!(response.json_value().unwrap()["user"], "Lighthouse Labs");
/// # });
/// ```
#[must_use]
#[derive(Debug, Clone)]
pub struct TestClient {
    app: Arc<App>,
    client_addr: SocketAddr,
    default_headers: Vec<(String, String)>,
}

impl TestClient {
    /// Wraps an assembled application.
    pub fn new(app: App) -> Self {
        Self {
            app: Arc::new(app),
            client_addr: DEFAULT_CLIENT_ADDR,
            default_headers: Vec::new(),
        }
    }

    /// Builds the application from `config` over a fresh in-memory store.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(App::new(config, Arc::new(MemoryStore::new())))
    }

    /// Sets the peer address of this client.
    pub fn with_client_addr(mut self, addr: SocketAddr) -> Self {
        self.client_addr = addr;
        self
    }

    /// Another client on the same application, appearing from `addr`.
    pub fn as_client(&self, addr: SocketAddr) -> Self {
        self.clone().with_client_addr(addr)
    }

    /// Adds a header sent with every request.
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// The application under test.
    #[must_use]
    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// The store behind the application.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DataStore> {
        self.app.store()
    }

    /// The peer address requests carry.
    #[must_use]
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// Starts a GET request.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::get(uri))
    }

    /// Starts a POST request.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::post(uri))
    }

    /// Starts a PUT request.
    pub fn put(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::put(uri))
    }

    /// Starts a PATCH request.
    pub fn patch(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::patch(uri))
    }

    /// Starts a DELETE request.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::delete(uri))
    }

    /// Starts an OPTIONS request.
    pub fn options(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::options(uri))
    }

    /// Starts a HEAD request.
    pub fn head(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::head(uri))
    }

    /// Starts a request with any method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequestBuilder::new(method, uri))
    }

    async fn dispatch(&self, request: TestRequest) -> Result<TestResponse, TestError> {
        let ctx = MiddlewareContext::new().with_client_addr(self.client_addr);
        let response = self.app.handle(ctx, request.into_http_request()?).await;
        TestResponse::from_http(response).await
    }
}

/// A request builder bound to a [`TestClient`].
#[must_use]
#[derive(Debug)]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    builder: TestRequestBuilder,
}

impl<'a> TestClientRequest<'a> {
    fn new(client: &'a TestClient, builder: TestRequestBuilder) -> Self {
        let builder = client
            .default_headers
            .iter()
            .fold(builder, |builder, (name, value)| builder.header(name, value));
        Self { client, builder }
    }

    /// Sets a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Sets `Content-Type`.
    pub fn content_type(mut self, content_type: impl AsRef<str>) -> Self {
        self.builder = self.builder.content_type(content_type);
        self
    }

    /// Sets `Origin`.
    pub fn origin(mut self, origin: impl AsRef<str>) -> Self {
        self.builder = self.builder.origin(origin);
        self
    }

    /// Sets `Accept-Encoding`.
    pub fn accept_encoding(mut self, encodings: impl AsRef<str>) -> Self {
        self.builder = self.builder.accept_encoding(encodings);
        self
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.builder = self.builder.body(body);
        self
    }

    /// Sets a JSON body.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.json(value);
        self
    }

    /// Sets a URL-encoded form body.
    pub fn form<T: Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.form(value);
        self
    }

    /// Sends the request.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body cannot be read;
    /// use [`try_send`](Self::try_send) to handle those.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(err) => panic!("test request failed: {err}"),
        }
    }

    /// Sends the request, returning build or read failures.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        let request = self.builder.build()?;
        self.client.dispatch(request).await
    }
}
