//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → circuit_breaker.rs (admit, or short-circuit to the fallback)
//!     → timeouts.rs (per-attempt deadline, connect timeout)
//!     → On failure: retries.rs (idempotent + transient only, with backoff)
//!     → Report one outcome per request to the breaker
//!     → fallback.rs (503 degraded-service body when the breaker gives up)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - Retries only for idempotent requests (GET, HEAD, PUT, DELETE, ...)
//! - Exhausted retries count as a single breaker failure
//! - Breaker state is per process, never shared between instances

pub mod backoff;
pub mod circuit_breaker;
pub mod fallback;
pub mod retries;
pub mod timeouts;
