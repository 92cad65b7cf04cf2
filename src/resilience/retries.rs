//! Retry policy for upstream calls.
//!
//! # Design Decisions
//! - Only idempotent methods are retried (RFC 9110 §9.2.2)
//! - Only transient failures count: connect errors, timeouts, 5xx
//! - 4xx responses are final
//! - The budget is the number of retries after the first attempt

use std::time::Duration;

use axum::http::{Method, StatusCode};

use crate::config::RetryConfig;
use crate::resilience::backoff::calculate_backoff;

/// Why an upstream attempt did not produce a usable response.
#[derive(Debug)]
pub enum AttemptFailure<R> {
    Connect(String),
    Timeout,
    /// 5xx from the upstream; the response is kept for pass-through.
    ServerError(R),
}

impl<R> AttemptFailure<R> {
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptFailure::Connect(_) => "connect",
            AttemptFailure::Timeout => "timeout",
            AttemptFailure::ServerError(_) => "server_error",
        }
    }
}

/// Whether a response status is a transient failure.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
}

/// Per-route retry decisions.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, config: &RetryConfig) -> Self {
        Self {
            max_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    /// Whether requests with this method may be attempted more than once.
    pub fn applies_to(&self, method: &Method) -> bool {
        self.max_retries > 0 && method.is_idempotent()
    }

    /// Whether another attempt is allowed after `failed_attempts` failures.
    pub fn should_retry(&self, method: &Method, failed_attempts: u32) -> bool {
        self.applies_to(method) && failed_attempts <= self.max_retries
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        calculate_backoff(retry, self.base_delay_ms, self.max_delay_ms)
    }
}
