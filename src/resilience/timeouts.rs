//! Upstream deadlines.
//!
//! Two bounds apply to every upstream call: the connector's connect timeout
//! and a per-attempt deadline covering the whole exchange up to response
//! headers. A request-wide safety timeout sits on the router.

use std::future::Future;
use std::time::Duration;

use hyper_util::client::legacy::connect::HttpConnector;

use crate::config::TimeoutConfig;

/// HTTP connector for upstream calls.
pub fn upstream_connector(config: &TimeoutConfig) -> HttpConnector {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_millis(config.connect_ms)));
    connector.set_nodelay(true);
    connector.enforce_http(true);
    connector
}

/// Outcome of a deadline-bounded call.
#[derive(Debug)]
pub enum Deadline<T> {
    Completed(T),
    Elapsed,
}

/// Run `fut` with a deadline.
pub async fn within<F: Future>(deadline: Duration, fut: F) -> Deadline<F::Output> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(out) => Deadline::Completed(out),
        Err(_) => Deadline::Elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_elapses() {
        let slow = tokio::time::sleep(Duration::from_secs(5));
        assert!(matches!(within(Duration::from_secs(1), slow).await, Deadline::Elapsed));

        let fast = async { 7 };
        assert!(matches!(within(Duration::from_secs(1), fast).await, Deadline::Completed(7)));
    }
}
