//! Request body decoding.
//!
//! JSON and URL-encoded bodies are decoded into [`ParsedBody`] before any
//! later stage runs. Other content types, and empty bodies, leave the
//! context's body as [`ParsedBody::Empty`]; the raw bytes stay on the
//! request either way.
//!
//! JSON is strict: only an object or an array is accepted at the top level.
//! URL-encoded bodies use bracket nesting, so `a[b]=1&c[]=x&c[]=y` becomes
//! `{"a":{"b":"1"},"c":["x","y"]}`.
//!
//! A body that cannot be decoded is rejected here with a client error and
//! never reaches the rate limiter or the handler.

use crate::context::{MiddlewareContext, ParsedBody};
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};
use bytes::Bytes;
use http::{header, StatusCode};
use http_body_util::{BodyExt, Full};
use serde_json::{Map, Value};

/// Default body size limit (100 KiB).
pub const DEFAULT_LIMIT: usize = 100 * 1024;

/// Maximum bracket nesting honoured in URL-encoded keys. Deeper segments are
/// kept as one literal key.
const MAX_DEPTH: usize = 5;

/// Body decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BodyError {
    /// The body does not parse as its declared type.
    #[error("malformed {kind} body: {reason}")]
    Malformed {
        /// Declared body kind.
        kind: &'static str,
        /// Parser message.
        reason: String,
    },

    /// The body exceeds the configured limit.
    #[error("request body exceeds the {limit} byte limit")]
    TooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },

    /// The connection failed while the body was being read.
    #[error("failed to read request body: {0}")]
    Unreadable(String),

    /// The declared charset is not UTF-8.
    #[error("unsupported charset \"{0}\"")]
    UnsupportedCharset(String),
}

impl BodyError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Malformed { .. } | Self::Unreadable(_) => StatusCode::BAD_REQUEST,
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedCharset(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "malformed_body",
            Self::TooLarge { .. } => "payload_too_large",
            Self::Unreadable(_) => "body_read_error",
            Self::UnsupportedCharset(_) => "unsupported_charset",
        }
    }

    /// Renders the error envelope.
    #[must_use]
    pub fn to_response(&self) -> Response {
        Response::json_error(self.status(), self.code(), &self.to_string())
    }
}

/// Body parser settings.
#[derive(Debug, Clone, Copy)]
pub struct BodyParserConfig {
    /// Largest accepted body in bytes.
    pub limit_bytes: usize,
}

impl Default for BodyParserConfig {
    fn default() -> Self {
        Self {
            limit_bytes: DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Json,
    Form,
}

/// Body parsing stage.
#[derive(Debug, Clone, Default)]
pub struct BodyParserMiddleware {
    config: BodyParserConfig,
}

impl BodyParserMiddleware {
    /// Creates the stage.
    #[must_use]
    pub fn new(config: BodyParserConfig) -> Self {
        Self { config }
    }

    /// Decodes `bytes` according to `content_type`.
    pub fn parse(&self, content_type: Option<&str>, bytes: &[u8]) -> Result<ParsedBody, BodyError> {
        let Some(content_type) = content_type else {
            return Ok(ParsedBody::Empty);
        };
        let Some(kind) = classify(content_type) else {
            return Ok(ParsedBody::Empty);
        };

        if bytes.len() > self.config.limit_bytes {
            return Err(BodyError::TooLarge {
                limit: self.config.limit_bytes,
            });
        }

        if let Some(charset) = charset(content_type) {
            if !charset.eq_ignore_ascii_case("utf-8") && !charset.eq_ignore_ascii_case("utf8") {
                return Err(BodyError::UnsupportedCharset(charset.to_string()));
            }
        }

        if bytes.is_empty() {
            return Ok(ParsedBody::Empty);
        }

        match kind {
            Kind::Json => parse_json(bytes).map(ParsedBody::Json),
            Kind::Form => parse_form(bytes).map(ParsedBody::Form),
        }
    }
}

fn classify(content_type: &str) -> Option<Kind> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence == "application/json" || (essence.starts_with("application/") && essence.ends_with("+json")) {
        Some(Kind::Json)
    } else if essence == "application/x-www-form-urlencoded" {
        Some(Kind::Form)
    } else {
        None
    }
}

fn charset(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}

fn parse_json(bytes: &[u8]) -> Result<Value, BodyError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| BodyError::Malformed {
        kind: "json",
        reason: e.to_string(),
    })?;

    match value {
        Value::Object(_) | Value::Array(_) => Ok(value),
        _ => Err(BodyError::Malformed {
            kind: "json",
            reason: "top-level value must be an object or array".to_string(),
        }),
    }
}

fn parse_form(bytes: &[u8]) -> Result<Value, BodyError> {
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(bytes).map_err(|e| BodyError::Malformed {
            kind: "urlencoded",
            reason: e.to_string(),
        })?;

    let mut root = Value::Object(Map::new());
    for (key, value) in pairs {
        if key.is_empty() {
            continue;
        }
        insert(&mut root, &split_key(&key), value);
    }
    Ok(root)
}

/// Splits `a[b][]` into `["a", "b", ""]`.
///
/// Keys whose brackets do not close are taken literally.
fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[').filter(|&i| i > 0) else {
        return vec![key.to_string()];
    };

    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            return vec![key.to_string()];
        };
        if segments.len() > MAX_DEPTH {
            segments.push(rest.to_string());
            return segments;
        }
        segments.push(inner[..close].to_string());
        rest = &inner[close + 1..];
    }

    if !rest.is_empty() {
        return vec![key.to_string()];
    }
    segments
}

fn insert(target: &mut Value, path: &[String], value: String) {
    let Some((segment, rest)) = path.split_first() else {
        return;
    };

    if target.is_null() {
        *target = if segment.is_empty() {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        };
    }

    match target {
        Value::Array(items) if segment.is_empty() => {
            if rest.is_empty() {
                items.push(Value::String(value));
            } else {
                items.push(Value::Null);
                if let Some(last) = items.last_mut() {
                    insert(last, rest, value);
                }
            }
        }
        Value::Array(items) => {
            // A named key under an array turns it into an index-keyed object
            let map: Map<String, Value> = items
                .drain(..)
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect();
            *target = Value::Object(map);
            insert(target, path, value);
        }
        Value::Object(map) => {
            let key = if segment.is_empty() {
                map.len().to_string()
            } else {
                segment.clone()
            };

            if rest.is_empty() {
                match map.get_mut(&key) {
                    Some(Value::Array(items)) => items.push(Value::String(value)),
                    Some(existing) => {
                        let previous = existing.take();
                        *existing = Value::Array(vec![previous, Value::String(value)]);
                    }
                    None => {
                        map.insert(key, Value::String(value));
                    }
                }
            } else {
                insert(map.entry(key).or_insert(Value::Null), rest, value);
            }
        }
        // A scalar already sits here; the deeper key cannot attach to it
        _ => {}
    }
}

impl Middleware for BodyParserMiddleware {
    fn name(&self) -> &'static str {
        "body_parser"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let bytes: Bytes = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(never) => match never {},
            };

            let content_type = parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());

            match self.parse(content_type, &bytes) {
                Ok(parsed) => ctx.set_body(parsed),
                Err(error) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        %error,
                        "rejecting request body"
                    );
                    return error.to_response();
                }
            }

            let request = Request::from_parts(parts, Full::new(bytes));
            next.run(ctx, request).await
        })
    }
}
