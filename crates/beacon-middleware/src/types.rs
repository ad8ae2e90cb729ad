//! Common types used throughout the middleware pipeline.

use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use http_body_util::Full;

/// The HTTP request type used in the middleware pipeline.
///
/// The body is fully buffered before the pipeline runs.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in the middleware pipeline.
pub type Response = http::Response<Full<Bytes>>;

/// Extension trait for building responses.
///
/// None of these constructors can fail: status and headers are set on an
/// already-built response.
pub trait ResponseExt {
    /// Creates an empty response with the given status.
    fn empty(status: StatusCode) -> Response;

    /// Creates a JSON response with the given status and body.
    fn json(status: StatusCode, body: &serde_json::Value) -> Response;

    /// Creates a JSON error response: `{"error":{"code":..,"message":..}}`.
    fn json_error(status: StatusCode, code: &str, message: &str) -> Response;
}

impl ResponseExt for Response {
    fn empty(status: StatusCode) -> Response {
        let mut response = http::Response::new(Full::new(Bytes::new()));
        *response.status_mut() = status;
        response
    }

    fn json(status: StatusCode, body: &serde_json::Value) -> Response {
        let mut response = http::Response::new(Full::new(Bytes::from(body.to_string())));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        response
    }

    fn json_error(status: StatusCode, code: &str, message: &str) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": code,
                "message": message
            }
        });
        Self::json(status, &body)
    }
}

/// Appends `token` to the response's `Vary` header unless already listed.
pub fn append_vary(response: &mut Response, token: &'static str) {
    let already = response
        .headers()
        .get_all(header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|v| v.trim().eq_ignore_ascii_case(token) || v.trim() == "*");

    if !already {
        response
            .headers_mut()
            .append(header::VARY, HeaderValue::from_static(token));
    }
}
