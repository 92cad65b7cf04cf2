//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_rate_limited_total` (counter): 429 responses
//! - `gateway_counter_store_errors_total` (counter): fail-open admissions
//! - `gateway_auth_rejections_total` (counter): 401 responses
//! - `gateway_upstream_retries_total` (counter): retry attempts by route
//! - `gateway_fallbacks_total` (counter): fallback bodies by service
//! - `gateway_circuit_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter, so
//! tests and `--check` runs need no setup.

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::time::Instant;

use crate::resilience::circuit_breaker::CircuitState;

pub mod names {
    pub const REQUESTS_TOTAL: &str = "gateway_requests_total";
    pub const REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";
    pub const RATE_LIMITED_TOTAL: &str = "gateway_rate_limited_total";
    pub const COUNTER_STORE_ERRORS_TOTAL: &str = "gateway_counter_store_errors_total";
    pub const AUTH_REJECTIONS_TOTAL: &str = "gateway_auth_rejections_total";
    pub const UPSTREAM_RETRIES_TOTAL: &str = "gateway_upstream_retries_total";
    pub const FALLBACKS_TOTAL: &str = "gateway_fallbacks_total";
    pub const CIRCUIT_BREAKER_STATE: &str = "gateway_circuit_breaker_state";
}

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(names::REQUESTS_TOTAL, "Requests handled by the gateway");
    describe_histogram!(names::REQUEST_DURATION_SECONDS, "End-to-end request latency in seconds");
    describe_counter!(names::RATE_LIMITED_TOTAL, "Requests rejected by the rate limiter");
    describe_counter!(
        names::COUNTER_STORE_ERRORS_TOTAL,
        "Counter store failures (requests admitted without limiting)"
    );
    describe_counter!(names::AUTH_REJECTIONS_TOTAL, "Requests rejected for a missing or invalid token");
    describe_counter!(names::UPSTREAM_RETRIES_TOTAL, "Upstream retry attempts");
    describe_counter!(names::FALLBACKS_TOTAL, "Fallback responses served");
    describe_gauge!(
        names::CIRCUIT_BREAKER_STATE,
        "Circuit breaker state (0 = closed, 1 = half-open, 2 = open)"
    );

    tracing::info!(address = %addr, "Prometheus metrics endpoint started");
    Ok(())
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    counter!(
        names::REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    histogram!(
        names::REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!(names::RATE_LIMITED_TOTAL).increment(1);
}

pub fn record_store_error(store: &str) {
    counter!(names::COUNTER_STORE_ERRORS_TOTAL, "store" => store.to_string()).increment(1);
}

pub fn record_auth_rejected() {
    counter!(names::AUTH_REJECTIONS_TOTAL).increment(1);
}

pub fn record_retry(route: &str) {
    counter!(names::UPSTREAM_RETRIES_TOTAL, "route" => route.to_string()).increment(1);
}

pub fn record_fallback(service: &str) {
    counter!(names::FALLBACKS_TOTAL, "service" => service.to_string()).increment(1);
}

pub fn record_breaker_state(breaker: &str, state: CircuitState) {
    gauge!(names::CIRCUIT_BREAKER_STATE, "breaker" => breaker.to_string()).set(state.as_gauge());
}
