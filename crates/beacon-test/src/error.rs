//! Test error types.

/// Errors raised while building a request or reading a response.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    /// The request could not be assembled.
    #[error("request build error: {0}")]
    RequestBuild(String),

    /// A header name or value is invalid.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The response body could not be read or decoded.
    #[error("body read error: {0}")]
    BodyRead(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Form encoding failed.
    #[error("form encoding error: {0}")]
    Form(#[from] serde_urlencoded::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = TestError::InvalidHeader("bad\nname".into());
        assert_eq!(err.to_string(), "invalid header: bad\nname");

        let err: TestError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, TestError::Json(_)));
    }
}
