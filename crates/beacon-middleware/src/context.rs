//! Middleware context types.
//!
//! The [`MiddlewareContext`] carries per-request state through the pipeline:
//! the request id, the client address, the parsed body, and typed extensions
//! middleware can use to annotate the request.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use uuid::Uuid;

/// A request body after the body parsing stage.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ParsedBody {
    /// No body, or a content type the parser does not decode.
    #[default]
    Empty,
    /// Decoded `application/json`.
    Json(serde_json::Value),
    /// Decoded `application/x-www-form-urlencoded`.
    Form(serde_json::Value),
}

impl ParsedBody {
    /// Returns the decoded value, regardless of source encoding.
    #[must_use]
    pub fn value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Empty => None,
            Self::Json(value) | Self::Form(value) => Some(value),
        }
    }

    /// Consumes the body and returns the decoded value.
    #[must_use]
    pub fn into_value(self) -> Option<serde_json::Value> {
        match self {
            Self::Empty => None,
            Self::Json(value) | Self::Form(value) => Some(value),
        }
    }

    /// Returns `true` for [`ParsedBody::Empty`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Context that flows through the middleware pipeline.
///
/// # Example
///
/// ```
/// use beacon_middleware::context::{MiddlewareContext, ParsedBody};
///
/// let mut ctx = MiddlewareContext::new().with_client_addr("10.0.0.7:51000".parse().unwrap());
/// assert_eq!(ctx.client_ip().unwrap().to_string(), "10.0.0.7");
/// assert!(ctx.body().is_empty());
///
/// ctx.set_body(ParsedBody::Json(serde_json::json!({"name": "Ada"})));
/// assert!(!ctx.body().is_empty());
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    /// Unique identifier for this request (UUID v7).
    request_id: Uuid,

    /// Peer address of the connection the request arrived on.
    client_addr: Option<SocketAddr>,

    /// Body as decoded by the body parsing stage.
    body: ParsedBody,

    /// When the request started processing.
    started_at: Instant,

    /// Type-erased extension data.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MiddlewareContext {
    /// Creates a new middleware context with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: Uuid::now_v7(),
            client_addr: None,
            body: ParsedBody::Empty,
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Sets the client address.
    #[must_use]
    pub fn with_client_addr(mut self, addr: SocketAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Returns the client socket address, if known.
    #[must_use]
    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    /// Returns the client IP address, if known.
    #[must_use]
    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_addr.map(|addr| addr.ip())
    }

    /// Returns the parsed body.
    #[must_use]
    pub fn body(&self) -> &ParsedBody {
        &self.body
    }

    /// Sets the parsed body.
    ///
    /// This should only be called by the body parsing stage.
    pub fn set_body(&mut self, body: ParsedBody) {
        self.body = body;
    }

    /// Takes the parsed body, leaving [`ParsedBody::Empty`].
    pub fn take_body(&mut self) -> ParsedBody {
        std::mem::take(&mut self.body)
    }

    /// Returns when the request started processing.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value.
    ///
    /// # Example
    ///
    /// ```
    /// use beacon_middleware::context::MiddlewareContext;
    ///
    /// struct RouteLabel(&'static str);
    ///
    /// let mut ctx = MiddlewareContext::new();
    /// ctx.set_extension(RouteLabel("users"));
    /// assert_eq!(ctx.get_extension::<RouteLabel>().unwrap().0, "users");
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }
}

impl Default for MiddlewareContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique() {
        let a = MiddlewareContext::new();
        let b = MiddlewareContext::new();
        assert_ne!(a.request_id(), b.request_id());
    }

    #[test]
    fn test_client_addr() {
        let ctx = MiddlewareContext::new();
        assert!(ctx.client_ip().is_none());

        let ctx = ctx.with_client_addr("[::1]:4000".parse().unwrap());
        assert_eq!(ctx.client_ip().unwrap().to_string(), "::1");
        assert_eq!(ctx.client_addr().unwrap().port(), 4000);
    }

    #[test]
    fn test_body_take() {
        let mut ctx = MiddlewareContext::new();
        ctx.set_body(ParsedBody::Form(serde_json::json!({"a": "1"})));

        let body = ctx.take_body();
        assert_eq!(body.value().unwrap()["a"], "1");
        assert!(ctx.body().is_empty());
    }

    #[test]
    fn test_parsed_body_into_value() {
        assert!(ParsedBody::Empty.into_value().is_none());
        let value = ParsedBody::Json(serde_json::json!([1, 2])).into_value().unwrap();
        assert_eq!(value, serde_json::json!([1, 2]));
    }

    #[test]
    fn test_extensions() {
        #[derive(Debug, Clone, PartialEq)]
        struct Marker {
            value: i32,
        }

        let mut ctx = MiddlewareContext::new();
        assert!(!ctx.has_extension::<Marker>());

        ctx.set_extension(Marker { value: 42 });
        assert_eq!(ctx.get_extension::<Marker>(), Some(&Marker { value: 42 }));

        assert_eq!(ctx.remove_extension::<Marker>(), Some(Marker { value: 42 }));
        assert!(!ctx.has_extension::<Marker>());
    }

    #[test]
    fn test_elapsed_time() {
        let ctx = MiddlewareContext::new();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(ctx.elapsed() >= std::time::Duration::from_millis(5));
    }
}
