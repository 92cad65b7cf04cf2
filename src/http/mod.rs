//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack, filter chain)
//!     → request.rs (request ID)
//!     → dispatcher.rs (route lookup, breaker, retries, forwarding)
//!         → upgrade.rs (101 tunnels)
//!     → response.rs (strip hop-by-hop, stream body)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod request;
pub mod response;
pub mod server;
pub mod upgrade;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
