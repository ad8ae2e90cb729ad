//! Test response wrapper.

use std::fmt;
use std::io::Read;

use crate::error::TestError;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Headers every gateway response carries.
pub const SECURITY_HEADERS: [&str; 6] = [
    "x-dns-prefetch-control",
    "x-frame-options",
    "strict-transport-security",
    "x-download-options",
    "x-content-type-options",
    "x-xss-protection",
];

/// A fully read response with assertion helpers.
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    /// Reads an HTTP response to completion.
    pub async fn from_http<B>(response: http::Response<B>) -> Result<Self, TestError>
    where
        B: BodyExt,
        B::Error: fmt::Display,
    {
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| TestError::BodyRead(e.to_string()))?
            .to_bytes();

        Ok(Self {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }

    /// Creates a response from raw parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// The status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The status code as a number.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Returns true for 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true for 4xx.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    /// The response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value by name.
    #[must_use]
    pub fn header(&self, name: impl AsRef<str>) -> Option<&HeaderValue> {
        self.headers.get(name.as_ref())
    }

    /// A header value as a string.
    #[must_use]
    pub fn header_str(&self, name: impl AsRef<str>) -> Option<&str> {
        self.header(name).and_then(|v| v.to_str().ok())
    }

    /// `Content-Type`.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header_str(header::CONTENT_TYPE.as_str())
    }

    /// `Content-Encoding`.
    #[must_use]
    pub fn content_encoding(&self) -> Option<&str> {
        self.header_str(header::CONTENT_ENCODING.as_str())
    }

    /// `X-RateLimit-Remaining`, parsed.
    #[must_use]
    pub fn rate_limit_remaining(&self) -> Option<u64> {
        self.header_str("x-ratelimit-remaining")
            .and_then(|v| v.parse().ok())
    }

    /// The body as received, possibly compressed.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body with any `Content-Encoding` removed.
    pub fn decoded_body(&self) -> Result<Bytes, TestError> {
        let mut decoded = Vec::new();
        let result = match self.content_encoding() {
            None | Some("identity") => return Ok(self.body.clone()),
            Some("gzip") => flate2::read::GzDecoder::new(&self.body[..]).read_to_end(&mut decoded),
            Some("deflate") => {
                flate2::read::ZlibDecoder::new(&self.body[..]).read_to_end(&mut decoded)
            }
            Some("br") => {
                brotli::Decompressor::new(&self.body[..], 4096).read_to_end(&mut decoded)
            }
            Some(other) => {
                return Err(TestError::BodyRead(format!(
                    "unsupported content encoding `{other}`"
                )))
            }
        };
        result.map_err(|e| TestError::BodyRead(e.to_string()))?;
        Ok(Bytes::from(decoded))
    }

    /// The decoded body as UTF-8.
    pub fn text(&self) -> Result<String, TestError> {
        String::from_utf8(self.decoded_body()?.to_vec())
            .map_err(|e| TestError::BodyRead(format!("invalid UTF-8: {e}")))
    }

    /// Deserializes the decoded body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TestError> {
        Ok(serde_json::from_slice(&self.decoded_body()?)?)
    }

    /// The decoded body as a JSON value.
    pub fn json_value(&self) -> Result<Value, TestError> {
        self.json()
    }

    /// The `error.code` of an error envelope, if the body is one.
    #[must_use]
    pub fn error_code(&self) -> Option<String> {
        let value = self.json_value().ok()?;
        value["error"]["code"].as_str().map(str::to_string)
    }

    /// Asserts the status code.
    ///
    /// # Panics
    ///
    /// Panics if the status differs.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "expected status {}, got {} with body {}",
            expected,
            self.status,
            String::from_utf8_lossy(&self.body)
        );
        self
    }

    /// Asserts a header value.
    ///
    /// # Panics
    ///
    /// Panics if the header is missing or differs.
    pub fn assert_header(&self, name: impl AsRef<str>, expected: impl AsRef<str>) -> &Self {
        let name = name.as_ref();
        let expected = expected.as_ref();
        let actual = self
            .header_str(name)
            .unwrap_or_else(|| panic!("header '{name}' not found"));
        assert_eq!(actual, expected, "header '{name}'");
        self
    }

    /// Asserts that every security header is present.
    ///
    /// # Panics
    ///
    /// Panics on the first missing header.
    pub fn assert_security_headers(&self) -> &Self {
        for name in SECURITY_HEADERS {
            assert!(
                self.headers.contains_key(name),
                "security header '{name}' missing on {} response",
                self.status
            );
        }
        self
    }

    /// Asserts the decoded JSON body.
    ///
    /// # Panics
    ///
    /// Panics if the body is not JSON or differs.
    pub fn assert_json_eq(&self, expected: &Value) -> &Self {
        let actual = self.json_value().unwrap_or_else(|e| panic!("body is not JSON: {e}"));
        assert_eq!(&actual, expected, "JSON body mismatch");
        self
    }

    /// Asserts one field of the decoded JSON body; `path` is dot-separated,
    /// numeric segments index arrays.
    ///
    /// # Panics
    ///
    /// Panics if the path is missing or the value differs.
    pub fn assert_json_field(&self, path: impl AsRef<str>, expected: &Value) -> &Self {
        let path = path.as_ref();
        let json = self.json_value().unwrap_or_else(|e| panic!("body is not JSON: {e}"));
        let actual = json_path(&json, path)
            .unwrap_or_else(|| panic!("JSON path '{path}' not found in {json}"));
        assert_eq!(actual, expected, "JSON field '{path}'");
        self
    }
}

impl fmt::Debug for TestResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

fn json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match segment.parse::<usize>() {
            Ok(index) => current.get(index),
            Err(_) => current.get(segment),
        })
}
