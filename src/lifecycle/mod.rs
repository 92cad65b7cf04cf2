//! Process lifecycle.
//!
//! ```text
//! startup.rs   config → logging → metrics exporter → bind → watcher → serve
//! signals.rs   SIGINT / SIGTERM stop the server; SIGHUP re-reads the config
//! shutdown.rs  broadcast handle the server and tests wait on
//! ```
//!
//! A bad config at startup is fatal. A bad config on reload is not.

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
