//! Edge gateway library.
//!
//! A single entry point in front of a set of HTTP services: path-prefix
//! routing, bearer token verification, per-client rate limiting, and
//! circuit-broken upstream dispatch with retries and static fallbacks.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
