//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: upstream assumed down, requests fail fast to the fallback
//! - Half-Open: a bounded number of trial requests probe for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first request after reset_timeout
//! Half-Open → Closed: consecutive probe successes >= success_threshold
//! Half-Open → Open: any probe failure (timeout clock restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker per name, per process; instances trip independently
//! - Every transition bumps a generation counter. Permits remember the
//!   generation they were issued in and outcomes from older generations are
//!   dropped, so racing completions cannot flip a newer phase
//! - The state lock is never held across an await

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Circuit breaker phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge value: 0 = closed, 1 = half-open, 2 = open.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Returned when the breaker refuses a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerOpen;

#[derive(Debug)]
struct BreakerState {
    phase: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    trials_in_flight: u32,
    last_transition: Instant,
    generation: u64,
}

/// Point-in-time view of a breaker, for the metrics surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

/// Per-route circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState {
                phase: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                trials_in_flight: 0,
                last_transition: Instant::now(),
                generation: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask to send one request upstream.
    ///
    /// An open breaker whose reset timeout has elapsed moves to half-open
    /// here, before the request is attempted.
    pub fn try_acquire(self: &Arc<Self>) -> Result<BreakerPermit, BreakerOpen> {
        let mut st = self.lock();

        if st.phase == CircuitState::Open {
            let reset = Duration::from_millis(self.config.reset_timeout_ms);
            if st.last_transition.elapsed() < reset {
                return Err(BreakerOpen);
            }
            self.transition(&mut st, CircuitState::HalfOpen);
        }

        let probe = match st.phase {
            CircuitState::Closed => false,
            CircuitState::HalfOpen if st.trials_in_flight < self.config.half_open_max_calls => {
                st.trials_in_flight += 1;
                true
            }
            _ => return Err(BreakerOpen),
        };

        Ok(BreakerPermit {
            breaker: Arc::clone(self),
            generation: st.generation,
            probe,
            settled: false,
        })
    }

    pub fn state(&self) -> CircuitState {
        self.lock().phase
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let st = self.lock();
        BreakerSnapshot {
            state: st.phase,
            consecutive_failures: st.consecutive_failures,
            consecutive_successes: st.consecutive_successes,
        }
    }

    fn on_success(&self, generation: u64, probe: bool) {
        let mut st = self.lock();
        if st.generation != generation {
            return;
        }
        match st.phase {
            CircuitState::Closed => st.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                if probe {
                    st.trials_in_flight = st.trials_in_flight.saturating_sub(1);
                }
                st.consecutive_successes += 1;
                if st.consecutive_successes >= self.config.success_threshold {
                    self.transition(&mut st, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, generation: u64) {
        let mut st = self.lock();
        if st.generation != generation {
            return;
        }
        match st.phase {
            CircuitState::Closed => {
                st.consecutive_failures += 1;
                if st.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut st, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => self.transition(&mut st, CircuitState::Open),
            CircuitState::Open => {}
        }
    }

    fn release(&self, generation: u64, probe: bool) {
        let mut st = self.lock();
        if probe && st.generation == generation && st.phase == CircuitState::HalfOpen {
            st.trials_in_flight = st.trials_in_flight.saturating_sub(1);
        }
    }

    fn transition(&self, st: &mut BreakerState, to: CircuitState) {
        let from = st.phase;
        st.phase = to;
        st.last_transition = Instant::now();
        st.generation += 1;
        st.consecutive_successes = 0;
        st.trials_in_flight = 0;
        if to == CircuitState::Closed {
            st.consecutive_failures = 0;
        }

        match to {
            CircuitState::Open => tracing::warn!(
                breaker = %self.name,
                from = %from,
                failures = st.consecutive_failures,
                "Circuit breaker opened"
            ),
            _ => tracing::info!(breaker = %self.name, from = %from, to = %to, "Circuit breaker transition"),
        }
        metrics::record_breaker_state(&self.name, to);
    }
}

/// Admission ticket for one upstream call.
///
/// Report the outcome with [`succeed`](Self::succeed) or [`fail`](Self::fail).
/// Dropping it unreported (client went away) frees a half-open trial slot
/// without counting as either.
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    generation: u64,
    probe: bool,
    settled: bool,
}

impl BreakerPermit {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.generation, self.probe);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.generation);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release(self.generation, self.probe);
        }
    }
}

/// Registry of circuit breakers keyed by breaker name.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the breaker for `name`, creating it on first use.
    ///
    /// A breaker whose settings changed (config reload) is replaced by a
    /// fresh closed one.
    pub fn get_or_create(&self, name: &str, config: &CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            if existing.config() == config {
                return Arc::clone(existing.value());
            }
        }

        let mut entry = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config.clone())));
        if entry.config() != config {
            *entry = Arc::new(CircuitBreaker::new(name, config.clone()));
        }
        Arc::clone(entry.value())
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| Arc::clone(b.value()))
    }

    pub fn snapshot(&self) -> BTreeMap<String, BreakerSnapshot> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            reset_timeout_ms: 1000,
            half_open_max_calls: 1,
        }
    }

    fn breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new("test", test_config()))
    }

    fn trip(cb: &Arc<CircuitBreaker>) {
        for _ in 0..cb.config().failure_threshold {
            cb.try_acquire().unwrap().fail();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn starts_closed() {
        let cb = breaker();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(!cb.try_acquire().unwrap().is_probe());
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_consecutive_failures() {
        let cb = breaker();

        cb.try_acquire().unwrap().fail();
        cb.try_acquire().unwrap().fail();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.try_acquire().unwrap().fail();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.try_acquire().unwrap_err(), BreakerOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_count() {
        let cb = breaker();
        cb.try_acquire().unwrap().fail();
        cb.try_acquire().unwrap().fail();
        assert_eq!(cb.snapshot().consecutive_failures, 2);

        cb.try_acquire().unwrap().succeed();
        assert_eq!(cb.snapshot().consecutive_failures, 0);

        cb.try_acquire().unwrap().fail();
        cb.try_acquire().unwrap().fail();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn single_probe_after_reset_timeout() {
        let cb = breaker();
        trip(&cb);

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(cb.try_acquire().is_err());

        tokio::time::advance(Duration::from_millis(1)).await;
        let probe = cb.try_acquire().unwrap();
        assert!(probe.is_probe());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // Only one trial in flight.
        assert!(cb.try_acquire().is_err());

        probe.succeed();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.try_acquire().unwrap().succeed();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failure_reopens_and_restarts_clock() {
        let cb = breaker();
        trip(&cb);
        tokio::time::advance(Duration::from_secs(1)).await;

        cb.try_acquire().unwrap().fail();
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(cb.try_acquire().is_err());
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(cb.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_probe_frees_its_slot() {
        let cb = breaker();
        trip(&cb);
        tokio::time::advance(Duration::from_secs(1)).await;

        drop(cb.try_acquire().unwrap());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().unwrap().is_probe());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_outcomes_are_ignored() {
        let cb = breaker();
        let slow = cb.try_acquire().unwrap();
        trip(&cb);
        tokio::time::advance(Duration::from_secs(1)).await;
        let probe = cb.try_acquire().unwrap();

        // A request admitted while closed finishes during half-open.
        slow.fail();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        probe.succeed();
        assert_eq!(cb.snapshot().consecutive_successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_failures_open_once() {
        let cb = breaker();
        let permits: Vec<_> = (0..10).map(|_| cb.try_acquire().unwrap()).collect();
        let handles: Vec<_> = permits
            .into_iter()
            .map(|p| tokio::spawn(async move { p.fail() }))
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.snapshot().consecutive_failures, 3);
    }

    #[test]
    fn registry_creates_breakers() {
        let registry = BreakerRegistry::new();
        let config = test_config();

        let b1 = registry.get_or_create("user-service", &config);
        let b2 = registry.get_or_create("user-service", &config);
        let b3 = registry.get_or_create("report-service", &config);

        assert!(Arc::ptr_eq(&b1, &b2));
        assert!(!Arc::ptr_eq(&b1, &b3));
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn registry_replaces_breaker_on_new_settings() {
        let registry = BreakerRegistry::new();
        let b1 = registry.get_or_create("svc", &test_config());
        let changed = CircuitBreakerConfig {
            failure_threshold: 9,
            ..test_config()
        };
        let b2 = registry.get_or_create("svc", &changed);
        assert!(!Arc::ptr_eq(&b1, &b2));
        assert_eq!(b2.config().failure_threshold, 9);
    }
}
