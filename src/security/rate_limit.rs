//! Per-client fixed-window rate limiting.
//!
//! Each client identity gets a counter keyed `rate:<identity>` in the shared
//! counter store. The first request of a window starts its expiry; requests
//! past the limit get 429 until the window ends.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::IntoResponse;
use futures_util::future::{BoxFuture, FutureExt};

use crate::config::RateLimitConfig;
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::security::counter_store::{CounterStore, StoreError};
use crate::security::{ClientIdentity, Filter, RequestContext, Verdict};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Result of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub limit: u64,
    pub count: u64,
}

impl RateDecision {
    pub fn allowed(&self) -> bool {
        self.count <= self.limit
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }

    /// Write the `X-RateLimit-*` headers.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining()));
    }
}

/// Fixed-window limiter over a [`CounterStore`].
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    limit: u64,
    window: Duration,
    store_timeout: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            limit: config.limit,
            window: Duration::from_secs(config.window_secs),
            store_timeout: Duration::from_millis(config.store_timeout_ms),
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Count one request for `identity`.
    ///
    /// Returns `None` when the store failed or timed out; the caller admits
    /// the request without rate headers.
    pub async fn check(&self, identity: &ClientIdentity) -> Option<RateDecision> {
        let key = format!("rate:{identity}");
        let result = match tokio::time::timeout(self.store_timeout, self.store.increment(&key, self.window)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.store_timeout)),
        };

        match result {
            Ok(count) => Some(RateDecision {
                limit: self.limit,
                count,
            }),
            Err(e) => {
                tracing::warn!(client = %identity, store = self.store.kind(), error = %e, "Counter store unavailable, failing open");
                metrics::record_store_error(self.store.kind());
                None
            }
        }
    }
}

/// Filter wrapping a [`RateLimiter`].
pub struct RateLimitFilter {
    limiter: Arc<RateLimiter>,
}

impl RateLimitFilter {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl Filter for RateLimitFilter {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn apply<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, Verdict> {
        async move {
            let Some(decision) = self.limiter.check(&ctx.identity).await else {
                return Verdict::Allow;
            };
            ctx.rate = Some(decision);

            if decision.allowed() {
                return Verdict::Allow;
            }

            tracing::warn!(client = %ctx.identity, count = decision.count, limit = decision.limit, "Rate limit exceeded");
            metrics::record_rate_limited();
            Verdict::Reject(GatewayError::RateLimitExceeded { limit: decision.limit }.into_response())
        }
        .boxed()
    }
}
