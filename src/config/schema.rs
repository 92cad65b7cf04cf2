//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the edge gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Ordered route definitions. Declaration order breaks prefix ties.
    pub routes: Vec<RouteConfig>,

    /// Bearer token verification.
    pub auth: AuthConfig,

    /// Per-client fixed-window rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Default circuit breaker settings, overridable per route.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Backoff between retry attempts.
    pub retries: RetryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// CORS preflight handling.
    pub cors: CorsConfig,

    /// Degraded-service responses.
    pub fallback: FallbackConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Static metadata served by `/gateway/info`.
    pub info: InfoConfig,

    /// Request size limits.
    pub limits: LimitsConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// A single route: path prefix to upstream binding plus its filters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub id: String,

    /// Path prefix to match (segment aware).
    pub path_prefix: String,

    /// Upstream base URL (e.g., "http://user-service:8081").
    pub upstream: String,

    /// Number of leading path segments removed before forwarding.
    #[serde(default)]
    pub strip_prefix: usize,

    /// Retries after the first attempt for idempotent requests.
    #[serde(default)]
    pub retries: u32,

    /// Circuit breaker name. Routes without one are never short-circuited.
    #[serde(default)]
    pub breaker: Option<String>,

    /// Fallback path, e.g. "/fallback/users".
    #[serde(default)]
    pub fallback: Option<String>,

    /// Upstream timeout in milliseconds (defaults to `timeouts.upstream_ms`).
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Per-route breaker tuning.
    #[serde(default)]
    pub circuit_breaker: Option<BreakerOverrides>,
}

impl RouteConfig {
    /// Minimal route with no filters.
    pub fn new(id: impl Into<String>, path_prefix: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path_prefix: path_prefix.into(),
            upstream: upstream.into(),
            strip_prefix: 0,
            retries: 0,
            breaker: None,
            fallback: None,
            timeout_ms: None,
            circuit_breaker: None,
        }
    }
}

/// Optional per-route replacements for the global breaker settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerOverrides {
    pub failure_threshold: Option<u32>,
    pub success_threshold: Option<u32>,
    pub reset_timeout_ms: Option<u64>,
    pub half_open_max_calls: Option<u32>,
}

/// Token verification settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared HMAC secret.
    pub secret: String,

    /// Accepted signing algorithms.
    pub algorithms: Vec<String>,

    /// Paths that skip token verification (prefix match).
    pub public_paths: Vec<String>,

    /// Header carrying the verified subject to the upstream.
    pub identity_header: String,

    /// Clock skew tolerated on `exp`, in seconds.
    pub leeway_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Change this in production.
            secret: "devflow-secret-key-change-in-production-needs-to-be-longer-for-hs512".to_string(),
            algorithms: vec!["HS256".to_string(), "HS384".to_string(), "HS512".to_string()],
            public_paths: [
                "/api/auth/",
                "/api/users/register",
                "/api/gateway/",
                "/gateway/",
                "/actuator/",
                "/fallback/",
                "/swagger-ui/",
                "/v3/api-docs/",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            identity_header: "X-Authenticated-User".to_string(),
            leeway_secs: 0,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Requests admitted per client per window.
    pub limit: u64,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Redis URL for the shared counter store. `None` keeps counters in process.
    pub redis_url: Option<String>,

    /// Deadline for a counter store round trip before failing open.
    pub store_timeout_ms: u64,

    /// Use the first `X-Forwarded-For` entry as the client address.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 100,
            window_secs: 60,
            redis_url: None,
            store_timeout_ms: 2000,
            trust_forwarded_for: true,
        }
    }
}

/// Circuit breaker defaults.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,

    /// Consecutive half-open successes that close it again.
    pub success_threshold: u32,

    /// Time spent open before a probe is allowed, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Concurrent trial requests while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout_ms: 30_000,
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Apply per-route overrides on top of these defaults.
    pub fn with_overrides(&self, overrides: Option<&BreakerOverrides>) -> Self {
        let Some(o) = overrides else {
            return self.clone();
        };
        Self {
            failure_threshold: o.failure_threshold.unwrap_or(self.failure_threshold),
            success_threshold: o.success_threshold.unwrap_or(self.success_threshold),
            reset_timeout_ms: o.reset_timeout_ms.unwrap_or(self.reset_timeout_ms),
            half_open_max_calls: o.half_open_max_calls.unwrap_or(self.half_open_max_calls),
        }
    }
}

/// Retry backoff configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 50,
            max_delay_ms: 1000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Default per-attempt upstream timeout in milliseconds.
    pub upstream_ms: u64,

    /// Outer bound on a whole request, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 2000,
            upstream_ms: 10_000,
            request_secs: 60,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            allowed_headers: vec!["*".to_string()],
            allow_credentials: true,
            max_age_secs: 3600,
        }
    }
}

/// Fallback payload configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Service name → human-readable message.
    pub messages: BTreeMap<String, String>,

    /// Suggestion appended to every fallback body.
    pub suggestion: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        let messages = [
            ("users", "User service is temporarily unavailable"),
            ("auth", "Authentication service is temporarily unavailable"),
            ("analysis", "Code analysis service is temporarily unavailable"),
            ("reports", "Report generation service is temporarily unavailable"),
            ("notifications", "Notification service is temporarily unavailable"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            messages,
            suggestion: "Please try again later or contact support if the issue persists".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,

    /// Enable Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Metadata reported by `/gateway/info`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InfoConfig {
    pub name: String,
    pub description: String,
}

impl Default for InfoConfig {
    fn default() -> Self {
        Self {
            name: "DevFlow API Gateway".to_string(),
            description: "API Gateway for DevFlow microservices platform".to_string(),
        }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}
