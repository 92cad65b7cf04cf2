//! Gateway configuration.
//!
//! # Data Flow
//! ```text
//! gateway.toml
//!     → loader.rs (TOML, then GATEWAY_* environment overrides)
//!     → validation.rs (every problem reported at once)
//!     → GatewayConfig, frozen for the life of the server
//!
//! Reload (file change or SIGHUP):
//!     watcher.rs → loader.rs → validation.rs
//!     → mpsc channel → HttpServer swaps the RouteTable
//!     → invalid files are logged and the running table kept
//! ```
//!
//! Only routes are hot-swapped. Auth, rate limit and store settings are
//! read once at startup.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    AuthConfig, BreakerOverrides, CircuitBreakerConfig, CorsConfig, FallbackConfig, GatewayConfig,
    InfoConfig, LimitsConfig, ListenerConfig, ObservabilityConfig, RateLimitConfig, RetryConfig,
    RouteConfig, TimeoutConfig,
};
