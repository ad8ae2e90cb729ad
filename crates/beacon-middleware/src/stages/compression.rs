//! Response compression.
//!
//! Negotiates an encoding from `Accept-Encoding` and compresses response
//! bodies that are large enough and of a compressible type.
//!
//! A response is left untouched when:
//!
//! - the request was `HEAD`
//! - the response already carries `Content-Encoding`
//! - the response sets `Cache-Control: no-transform`
//! - the body is below the threshold or its type does not compress well
//!
//! `Vary: Accept-Encoding` is appended in every case so caches key on it.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{append_vary, Request, Response};
use bytes::Bytes;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression as FlateLevel;
use http::{header, HeaderValue, Method};
use http_body_util::{BodyExt, Full};
use std::io::Write;

/// Default minimum body size, in bytes, before compression is attempted.
pub const DEFAULT_THRESHOLD: usize = 1024;

/// Content encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Gzip (RFC 1952).
    Gzip,
    /// zlib-wrapped deflate (RFC 1950), as HTTP `deflate` is defined.
    Deflate,
    /// Brotli (RFC 7932).
    Brotli,
    /// No encoding.
    Identity,
}

impl Algorithm {
    /// Returns the `Content-Encoding` token.
    #[must_use]
    pub const fn encoding_name(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
            Self::Brotli => "br",
            Self::Identity => "identity",
        }
    }

    /// Parses an `Accept-Encoding` coding token.
    #[must_use]
    pub fn from_encoding(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "deflate" => Some(Self::Deflate),
            "br" => Some(Self::Brotli),
            "identity" => Some(Self::Identity),
            _ => None,
        }
    }
}

/// Compression effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    /// Fastest, lowest ratio.
    Fast,
    /// zlib's default (6).
    #[default]
    Default,
    /// Slowest, best ratio.
    Best,
}

impl CompressionLevel {
    fn flate(self) -> FlateLevel {
        match self {
            Self::Fast => FlateLevel::fast(),
            Self::Default => FlateLevel::default(),
            Self::Best => FlateLevel::best(),
        }
    }

    fn brotli_quality(self) -> i32 {
        match self {
            Self::Fast => 1,
            Self::Default => 6,
            Self::Best => 11,
        }
    }
}

/// Errors raised while encoding a body.
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    /// The encoder failed to write.
    #[error("{algorithm} encoder failed: {source}")]
    Io {
        /// Encoding being produced.
        algorithm: &'static str,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Compression settings.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Supported encodings in server preference order. Used to break ties
    /// between encodings the client weights equally.
    pub algorithms: Vec<Algorithm>,
    /// Minimum body size in bytes.
    pub threshold: usize,
    /// Compression effort.
    pub level: CompressionLevel,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithms: vec![Algorithm::Gzip, Algorithm::Deflate, Algorithm::Brotli],
            threshold: DEFAULT_THRESHOLD,
            level: CompressionLevel::Default,
        }
    }
}

/// Response compression stage.
#[derive(Debug, Clone, Default)]
pub struct CompressionMiddleware {
    config: CompressionConfig,
}

impl CompressionMiddleware {
    /// Creates the stage with the given settings.
    #[must_use]
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    /// Picks the encoding for a request's `Accept-Encoding` value.
    ///
    /// The highest client weight wins; equal weights fall back to server
    /// preference. `*` weights any supported coding not listed explicitly.
    /// Returns `None` when identity is preferred or nothing acceptable is
    /// supported.
    #[must_use]
    pub fn select_algorithm(&self, accept_encoding: &str) -> Option<Algorithm> {
        let offered = parse_accept_encoding(accept_encoding);
        let wildcard = offered
            .iter()
            .find(|(coding, _)| coding.is_none())
            .map(|(_, q)| *q);

        let weight = |algorithm: Algorithm| -> f32 {
            offered
                .iter()
                .find(|(coding, _)| *coding == Some(algorithm))
                .map(|(_, q)| *q)
                .or(wildcard)
                .unwrap_or(0.0)
        };

        let mut best: Option<(Algorithm, f32)> = None;
        for &algorithm in &self.config.algorithms {
            let q = weight(algorithm);
            if q > 0.0 && best.map_or(true, |(_, best_q)| q > best_q) {
                best = Some((algorithm, q));
            }
        }

        let (algorithm, q) = best?;
        let identity = offered
            .iter()
            .find(|(coding, _)| *coding == Some(Algorithm::Identity))
            .map(|(_, q)| *q);
        if identity.is_some_and(|identity_q| identity_q > q) {
            return None;
        }
        Some(algorithm)
    }

    /// Encodes `data` with `algorithm`.
    pub fn compress(&self, data: &[u8], algorithm: Algorithm) -> Result<Vec<u8>, CompressionError> {
        let io_err = |source: std::io::Error| CompressionError::Io {
            algorithm: algorithm.encoding_name(),
            source,
        };

        match algorithm {
            Algorithm::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), self.config.level.flate());
                encoder.write_all(data).map_err(io_err)?;
                encoder.finish().map_err(io_err)
            }
            Algorithm::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), self.config.level.flate());
                encoder.write_all(data).map_err(io_err)?;
                encoder.finish().map_err(io_err)
            }
            Algorithm::Brotli => {
                let params = brotli::enc::BrotliEncoderParams {
                    quality: self.config.level.brotli_quality(),
                    ..Default::default()
                };
                let mut output = Vec::new();
                brotli::BrotliCompress(&mut std::io::Cursor::new(data), &mut output, &params)
                    .map_err(io_err)?;
                Ok(output)
            }
            Algorithm::Identity => Ok(data.to_vec()),
        }
    }

    fn eligible(response: &Response) -> bool {
        let headers = response.headers();
        if headers.contains_key(header::CONTENT_ENCODING) {
            return false;
        }

        let no_transform = headers
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| {
                v.split(',')
                    .any(|directive| directive.trim().eq_ignore_ascii_case("no-transform"))
            });
        if no_transform {
            return false;
        }

        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(is_compressible)
    }
}

/// Parses `Accept-Encoding` into `(coding, weight)` pairs.
///
/// `None` stands for the `*` wildcard. Unknown codings are dropped.
fn parse_accept_encoding(value: &str) -> Vec<(Option<Algorithm>, f32)> {
    value
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split(';');
            let coding = pieces.next()?.trim();
            if coding.is_empty() {
                return None;
            }

            let q = pieces
                .filter_map(|param| param.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .map_or(1.0, |q| q.clamp(0.0, 1.0));

            if coding == "*" {
                Some((None, q))
            } else {
                Algorithm::from_encoding(coding).map(|algorithm| (Some(algorithm), q))
            }
        })
        .collect()
}

/// Returns true for media types worth compressing.
fn is_compressible(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    essence.starts_with("text/")
        || essence.ends_with("+json")
        || essence.ends_with("+xml")
        || matches!(
            essence.as_str(),
            "application/json"
                | "application/javascript"
                | "application/xml"
                | "application/x-www-form-urlencoded"
                | "image/svg+xml"
        )
}

impl Middleware for CompressionMiddleware {
    fn name(&self) -> &'static str {
        "compression"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let algorithm = if request.method() == Method::HEAD {
                None
            } else {
                request
                    .headers()
                    .get(header::ACCEPT_ENCODING)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| self.select_algorithm(v))
            };

            let mut response = next.run(ctx, request).await;
            append_vary(&mut response, "Accept-Encoding");

            let algorithm = match algorithm {
                Some(Algorithm::Identity) | None => return response,
                Some(algorithm) if Self::eligible(&response) => algorithm,
                Some(_) => return response,
            };

            let (mut parts, body) = response.into_parts();
            let bytes = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(never) => match never {},
            };

            if bytes.len() < self.config.threshold {
                return Response::from_parts(parts, Full::new(bytes));
            }

            match self.compress(&bytes, algorithm) {
                Ok(compressed) => {
                    parts.headers.insert(
                        header::CONTENT_ENCODING,
                        HeaderValue::from_static(algorithm.encoding_name()),
                    );
                    parts.headers.remove(header::CONTENT_LENGTH);
                    Response::from_parts(parts, Full::new(Bytes::from(compressed)))
                }
                Err(error) => {
                    tracing::warn!(%error, "sending response uncompressed");
                    Response::from_parts(parts, Full::new(bytes))
                }
            }
        })
    }
}
