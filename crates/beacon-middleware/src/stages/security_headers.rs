//! Protective response headers.
//!
//! Sets a fixed header set on every response that passes through, including
//! rejections produced by later stages, and strips `X-Powered-By`.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use http::{HeaderName, HeaderValue};

/// Header values set by [`SecurityHeadersMiddleware`].
///
/// A `None` field leaves that header unset.
#[derive(Debug, Clone)]
pub struct SecurityHeadersConfig {
    /// `X-DNS-Prefetch-Control`.
    pub dns_prefetch_control: Option<HeaderValue>,
    /// `X-Frame-Options`.
    pub frame_options: Option<HeaderValue>,
    /// `Strict-Transport-Security`.
    pub strict_transport_security: Option<HeaderValue>,
    /// `X-Download-Options`.
    pub download_options: Option<HeaderValue>,
    /// `X-Content-Type-Options`.
    pub content_type_options: Option<HeaderValue>,
    /// `X-XSS-Protection`.
    pub xss_protection: Option<HeaderValue>,
    /// Remove `X-Powered-By` from responses.
    pub hide_powered_by: bool,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            dns_prefetch_control: Some(HeaderValue::from_static("off")),
            frame_options: Some(HeaderValue::from_static("SAMEORIGIN")),
            strict_transport_security: Some(HeaderValue::from_static(
                "max-age=15552000; includeSubDomains",
            )),
            download_options: Some(HeaderValue::from_static("noopen")),
            content_type_options: Some(HeaderValue::from_static("nosniff")),
            xss_protection: Some(HeaderValue::from_static("1; mode=block")),
            hide_powered_by: true,
        }
    }
}

impl SecurityHeadersConfig {
    fn entries(&self) -> Vec<(HeaderName, HeaderValue)> {
        [
            ("x-dns-prefetch-control", &self.dns_prefetch_control),
            ("x-frame-options", &self.frame_options),
            ("strict-transport-security", &self.strict_transport_security),
            ("x-download-options", &self.download_options),
            ("x-content-type-options", &self.content_type_options),
            ("x-xss-protection", &self.xss_protection),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .clone()
                .map(|value| (HeaderName::from_static(name), value))
        })
        .collect()
    }
}

/// Security headers stage.
#[derive(Debug, Clone)]
pub struct SecurityHeadersMiddleware {
    headers: Vec<(HeaderName, HeaderValue)>,
    hide_powered_by: bool,
}

impl SecurityHeadersMiddleware {
    /// Creates the stage.
    #[must_use]
    pub fn new(config: SecurityHeadersConfig) -> Self {
        Self {
            headers: config.entries(),
            hide_powered_by: config.hide_powered_by,
        }
    }

    /// Applies the header set to a response.
    pub fn apply(&self, response: &mut Response) {
        let map = response.headers_mut();
        for (name, value) in &self.headers {
            map.insert(name.clone(), value.clone());
        }
        if self.hide_powered_by {
            map.remove("x-powered-by");
        }
    }
}

impl Default for SecurityHeadersMiddleware {
    fn default() -> Self {
        Self::new(SecurityHeadersConfig::default())
    }
}

impl Middleware for SecurityHeadersMiddleware {
    fn name(&self) -> &'static str {
        "security_headers"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let mut response = next.run(ctx, request).await;
            self.apply(&mut response);
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseExt;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;

    async fn run(mw: &SecurityHeadersMiddleware, status: StatusCode) -> Response {
        let request = http::Request::builder()
            .uri("/")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let next = Next::handler(move |_ctx, _req| {
            Box::pin(async move {
                let mut response = Response::empty(status);
                response
                    .headers_mut()
                    .insert("x-powered-by", HeaderValue::from_static("Express"));
                response
            })
        });
        let mut ctx = MiddlewareContext::new();
        mw.process(&mut ctx, request, next).await
    }

    #[tokio::test]
    async fn test_default_headers_on_any_status() {
        let mw = SecurityHeadersMiddleware::default();

        for status in [StatusCode::OK, StatusCode::FORBIDDEN, StatusCode::TOO_MANY_REQUESTS] {
            let response = run(&mw, status).await;
            let headers = response.headers();
            assert_eq!(headers["x-dns-prefetch-control"], "off");
            assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
            assert_eq!(
                headers["strict-transport-security"],
                "max-age=15552000; includeSubDomains"
            );
            assert_eq!(headers["x-download-options"], "noopen");
            assert_eq!(headers["x-content-type-options"], "nosniff");
            assert_eq!(headers["x-xss-protection"], "1; mode=block");
            assert!(headers.get("x-powered-by").is_none());
        }
    }

    #[tokio::test]
    async fn test_disabled_headers() {
        let mw = SecurityHeadersMiddleware::new(SecurityHeadersConfig {
            strict_transport_security: None,
            hide_powered_by: false,
            ..SecurityHeadersConfig::default()
        });

        let response = run(&mw, StatusCode::OK).await;
        assert!(response.headers().get("strict-transport-security").is_none());
        assert_eq!(response.headers()["x-powered-by"], "Express");
        assert_eq!(response.headers()["x-frame-options"], "SAMEORIGIN");
    }
}
