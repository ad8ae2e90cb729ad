//! Fixed-window rate limiting.
//!
//! Each client key owns a bucket holding a request count and the instant its
//! window opened. A request increments its bucket and is rejected with
//! `429 Too Many Requests` once the count exceeds the limit. When a full
//! window has elapsed since the bucket opened, the count starts over.
//!
//! All bucket reads and writes happen under one lock, so concurrent
//! requests from the same client never lose an increment.
//!
//! ## Example
//!
//! ```
//! use beacon_middleware::stages::{Decision, RateLimitConfig, RateLimiter};
//! use std::time::Duration;
//!
//! let limiter = RateLimiter::new(RateLimitConfig {
//!     max: 2,
//!     window: Duration::from_secs(60),
//!     ..RateLimitConfig::default()
//! });
//!
//! assert!(limiter.check("10.0.0.1").is_allowed());
//! assert!(limiter.check("10.0.0.1").is_allowed());
//! assert!(matches!(limiter.check("10.0.0.1"), Decision::Limited { .. }));
//! assert!(limiter.check("10.0.0.2").is_allowed());
//! ```

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};
use http::{HeaderValue, StatusCode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Rate limit header names.
pub mod headers {
    /// Maximum requests allowed in the window.
    pub const LIMIT: &str = "x-ratelimit-limit";
    /// Remaining requests in the current window.
    pub const REMAINING: &str = "x-ratelimit-remaining";
    /// Seconds to wait before retrying (on 429).
    pub const RETRY_AFTER: &str = "retry-after";
}

/// Default message of the 429 body.
pub const DEFAULT_MESSAGE: &str = "Too many requests, please try again later.";

/// Bucket count above which expired buckets are swept on insert.
const PRUNE_THRESHOLD: usize = 10_000;

/// Bucket key for a request: the peer IP of the connection.
fn client_key(ctx: &MiddlewareContext) -> String {
    ctx.client_ip()
        .map_or_else(|| "unknown".to_string(), |ip| ip.to_string())
}

/// Rate limit settings.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per window.
    pub max: u64,
    /// Window length.
    pub window: Duration,
    /// Message carried by the 429 body.
    pub message: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max: 30,
            window: Duration::from_millis(60_000),
            message: DEFAULT_MESSAGE.to_string(),
        }
    }
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Allowed {
        /// Configured maximum.
        limit: u64,
        /// Requests left in this window.
        remaining: u64,
    },
    /// The request must be rejected.
    Limited {
        /// Configured maximum.
        limit: u64,
        /// Time until the bucket's window closes.
        retry_after: Duration,
    },
}

impl Decision {
    /// Returns true for [`Decision::Allowed`].
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u64,
    window_start: Instant,
}

/// The bucket map.
#[derive(Debug)]
pub struct RateLimiter {
    max: u64,
    window: Duration,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// Creates an empty limiter.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            max: config.max,
            window: config.window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Counts one request for `key`.
    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Decision {
        let mut buckets = self.buckets.lock();

        if buckets.len() > PRUNE_THRESHOLD && !buckets.contains_key(key) {
            let window = self.window;
            buckets.retain(|_, bucket| now.duration_since(bucket.window_start) < window);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            count: 0,
            window_start: now,
        });

        if now.duration_since(bucket.window_start) >= self.window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        bucket.count = bucket.count.saturating_add(1);

        if bucket.count > self.max {
            let retry_after = self
                .window
                .saturating_sub(now.duration_since(bucket.window_start));
            Decision::Limited {
                limit: self.max,
                retry_after,
            }
        } else {
            Decision::Allowed {
                limit: self.max,
                remaining: self.max - bucket.count,
            }
        }
    }

    /// Number of live buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}

/// Rate limiting stage.
#[derive(Debug, Clone)]
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
    message: String,
}

impl RateLimitMiddleware {
    /// Creates the stage with a fresh bucket map.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        let message = config.message.clone();
        Self {
            limiter: Arc::new(RateLimiter::new(config)),
            message,
        }
    }

    /// Returns the shared limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn rejection(&self, limit: u64, retry_after: Duration) -> Response {
        let mut response =
            Response::json_error(StatusCode::TOO_MANY_REQUESTS, "rate_limited", &self.message);

        // Retry-After is whole seconds, rounded up
        let seconds = u64::try_from(retry_after.as_millis().div_ceil(1000))
            .unwrap_or(u64::MAX)
            .max(1);
        let map = response.headers_mut();
        map.insert(headers::LIMIT, HeaderValue::from(limit));
        map.insert(headers::REMAINING, HeaderValue::from(0u64));
        map.insert(headers::RETRY_AFTER, HeaderValue::from(seconds));
        response
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let key = client_key(ctx);

            match self.limiter.check(&key) {
                Decision::Allowed { limit, remaining } => {
                    let mut response = next.run(ctx, request).await;
                    let map = response.headers_mut();
                    map.insert(headers::LIMIT, HeaderValue::from(limit));
                    map.insert(headers::REMAINING, HeaderValue::from(remaining));
                    response
                }
                Decision::Limited { limit, retry_after } => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        key = %key,
                        "rate limit exceeded"
                    );
                    self.rejection(limit, retry_after)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn limiter(max: u64, window_ms: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max,
            window: Duration::from_millis(window_ms),
            ..RateLimitConfig::default()
        })
    }

    fn request() -> Request {
        http::Request::builder()
            .uri("/api/messages")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn send(mw: &RateLimitMiddleware, client: &str, hits: &Arc<AtomicUsize>) -> Response {
        let hits = Arc::clone(hits);
        let mut ctx = MiddlewareContext::new().with_client_addr(client.parse().unwrap());
        let next = Next::handler(move |_ctx, _req| {
            hits.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Response::empty(StatusCode::OK) })
        });
        mw.process(&mut ctx, request(), next).await
    }

    #[test]
    fn test_thirtieth_allowed_thirty_first_rejected() {
        let limiter = limiter(30, 60_000);
        for i in 1..=30 {
            assert_eq!(
                limiter.check("a"),
                Decision::Allowed {
                    limit: 30,
                    remaining: 30 - i
                }
            );
        }
        assert!(!limiter.check("a").is_allowed());
        assert!(!limiter.check("a").is_allowed());
    }

    #[test]
    fn test_window_reset_is_fixed_not_sliding() {
        let limiter = limiter(2, 1000);
        let start = Instant::now();

        assert!(limiter.check_at("a", start).is_allowed());
        assert!(limiter.check_at("a", start + Duration::from_millis(900)).is_allowed());
        assert!(!limiter.check_at("a", start + Duration::from_millis(999)).is_allowed());

        // Window opened at `start`, so it closes 1000 ms later regardless of
        // when the later requests arrived
        assert_eq!(
            limiter.check_at("a", start + Duration::from_millis(1000)),
            Decision::Allowed {
                limit: 2,
                remaining: 1
            }
        );
    }

    #[test]
    fn test_retry_after_counts_down() {
        let limiter = limiter(1, 60_000);
        let start = Instant::now();
        limiter.check_at("a", start);

        match limiter.check_at("a", start + Duration::from_secs(15)) {
            Decision::Limited { retry_after, .. } => {
                assert_eq!(retry_after, Duration::from_secs(45));
            }
            other => panic!("expected limited, got {other:?}"),
        }
    }

    #[test]
    fn test_expired_buckets_pruned() {
        let limiter = limiter(5, 1000);
        let start = Instant::now();
        for i in 0..=PRUNE_THRESHOLD {
            limiter.check_at(&format!("client-{i}"), start);
        }
        assert_eq!(limiter.bucket_count(), PRUNE_THRESHOLD + 1);

        limiter.check_at("late", start + Duration::from_secs(2));
        assert_eq!(limiter.bucket_count(), 1);
    }

    #[test]
    fn test_client_key() {
        let ctx = MiddlewareContext::new().with_client_addr("192.0.2.4:5000".parse().unwrap());
        assert_eq!(client_key(&ctx), "192.0.2.4");

        // Same host, different source port: one bucket
        let other_port = MiddlewareContext::new().with_client_addr("192.0.2.4:6000".parse().unwrap());
        assert_eq!(client_key(&other_port), client_key(&ctx));

        assert_eq!(client_key(&MiddlewareContext::new()), "unknown");
    }

    #[tokio::test]
    async fn test_rejection_short_circuits() {
        let mw = RateLimitMiddleware::new(RateLimitConfig {
            max: 2,
            ..RateLimitConfig::default()
        });
        let hits = Arc::new(AtomicUsize::new(0));

        let first = send(&mw, "10.1.1.1:1000", &hits).await;
        assert_eq!(first.headers().get(headers::LIMIT).unwrap(), "2");
        assert_eq!(first.headers().get(headers::REMAINING).unwrap(), "1");

        send(&mw, "10.1.1.1:1001", &hits).await;
        let third = send(&mw, "10.1.1.1:1002", &hits).await;

        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(third.headers().get(headers::RETRY_AFTER).unwrap(), "60");
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        let body = third.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"]["code"], "rate_limited");
        assert_eq!(body["error"]["message"], DEFAULT_MESSAGE);

        // Same IP on a different port shares the bucket; another IP does not
        let other = send(&mw, "10.1.1.2:1000", &hits).await;
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_elapses_with_paused_clock() {
        let mw = RateLimitMiddleware::new(RateLimitConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..30 {
            send(&mw, "10.2.0.1:1", &hits).await;
        }
        let limited = send(&mw, "10.2.0.1:1", &hits).await;
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

        tokio::time::advance(Duration::from_millis(60_000)).await;

        let reset = send(&mw, "10.2.0.1:1", &hits).await;
        assert_eq!(reset.status(), StatusCode::OK);
        assert_eq!(reset.headers().get(headers::REMAINING).unwrap(), "29");
        assert_eq!(hits.load(Ordering::SeqCst), 31);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let limiter = Arc::new(limiter(1000, 60_000));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    for _ in 0..100 {
                        limiter.check("shared");
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(
            limiter.check("shared"),
            Decision::Allowed {
                limit: 1000,
                remaining: 199
            }
        );
    }

    proptest! {
        #[test]
        fn prop_first_max_requests_pass(max in 1u64..60, requests in 1usize..150) {
            let limiter = limiter(max, 60_000);
            let start = Instant::now();
            let outcomes: Vec<bool> = (0..requests)
                .map(|i| limiter.check_at("k", start + Duration::from_millis(i as u64)).is_allowed())
                .collect();

            for (i, allowed) in outcomes.iter().enumerate() {
                prop_assert_eq!(*allowed, (i as u64) < max);
            }
        }

        #[test]
        fn prop_full_window_resets(max in 1u64..20, before in 0u64..40, gap in 0u64..5000) {
            let window = Duration::from_millis(1000);
            let limiter = limiter(max, 1000);
            let start = Instant::now();
            for _ in 0..before {
                limiter.check_at("k", start);
            }

            let later = start + window + Duration::from_millis(gap);
            prop_assert_eq!(
                limiter.check_at("k", later),
                Decision::Allowed { limit: max, remaining: max - 1 }
            );
        }
    }
}
