//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, pretty or JSON)
//!     → metrics.rs (counters, gauges, histograms)
//!     → tracing.rs (per-request spans keyed by request ID)
//!
//! Consumers:
//!     → stdout log aggregation
//!     → Prometheus scrape on the metrics address
//! ```
//!
//! # Design Decisions
//! - Request ID flows from the edge to the upstream and back
//! - Metrics are cheap (atomic increments) and no-ops until installed

pub mod logging;
pub mod metrics;
pub mod tracing;
