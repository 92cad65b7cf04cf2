//! Shared counters for fixed-window rate limiting.
//!
//! A counter is created on the first increment of a window and expires with
//! it. Two stores exist:
//! - [`RedisCounterStore`]: shared by every gateway instance
//! - [`MemoryCounterStore`]: process-local, for single instances and tests

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use futures_util::future::{self, BoxFuture, FutureExt};
use redis::aio::MultiplexedConnection;
use thiserror::Error;
use tokio::time::Instant;

/// INCR and start the TTL on first increment, in one round trip.
const INCR_WITH_EXPIRY: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("counter store error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("counter store did not answer within {0:?}")]
    Timeout(Duration),
}

/// Atomic per-key window counter.
pub trait CounterStore: Send + Sync + 'static {
    /// Increment `key` and return the new count. The first increment starts a
    /// window of length `window` after which the key resets.
    fn increment<'a>(&'a self, key: &'a str, window: Duration) -> BoxFuture<'a, Result<u64, StoreError>>;

    /// Check the store is reachable.
    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Short label for health output ("redis", "memory").
    fn kind(&self) -> &'static str;

    /// Drop expired windows. Only meaningful for in-process stores.
    fn purge_expired(&self) {}
}

/// Build the configured store: Redis when a URL is given, memory otherwise.
pub fn from_url(redis_url: Option<&str>) -> Result<Arc<dyn CounterStore>, StoreError> {
    match redis_url {
        Some(url) => Ok(Arc::new(RedisCounterStore::new(url)?)),
        None => Ok(Arc::new(MemoryCounterStore::new())),
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u64,
    expires_at: Instant,
}

/// In-process counters.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, WindowCounter>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn increment_now(&self, key: &str, window: Duration) -> u64 {
        let now = Instant::now();
        let mut entry = self.counters.entry(key.to_string()).or_insert(WindowCounter {
            count: 0,
            expires_at: now + window,
        });
        if entry.expires_at <= now {
            entry.count = 0;
            entry.expires_at = now + window;
        }
        entry.count += 1;
        entry.count
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl CounterStore for MemoryCounterStore {
    fn increment<'a>(&'a self, key: &'a str, window: Duration) -> BoxFuture<'a, Result<u64, StoreError>> {
        future::ready(Ok(self.increment_now(key, window))).boxed()
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        future::ready(Ok(())).boxed()
    }

    fn kind(&self) -> &'static str {
        "memory"
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.counters.retain(|_, c| c.expires_at > now);
    }
}

/// Redis-backed counters shared across gateway instances.
///
/// One multiplexed connection is opened lazily and reused. It is dropped on
/// any error so the next call reconnects.
pub struct RedisCounterStore {
    client: redis::Client,
    script: redis::Script,
    connection: ArcSwapOption<MultiplexedConnection>,
}

impl RedisCounterStore {
    pub fn new(url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            script: redis::Script::new(INCR_WITH_EXPIRY),
            connection: ArcSwapOption::empty(),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        if let Some(conn) = self.connection.load_full() {
            return Ok((*conn).clone());
        }
        let conn = self.client.get_multiplexed_async_connection().await?;
        self.connection.store(Some(Arc::new(conn.clone())));
        tracing::debug!("Counter store connection established");
        Ok(conn)
    }

    async fn with_reset<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let result = fut.await;
        if result.is_err() {
            self.connection.store(None);
        }
        result
    }
}

impl CounterStore for RedisCounterStore {
    fn increment<'a>(&'a self, key: &'a str, window: Duration) -> BoxFuture<'a, Result<u64, StoreError>> {
        async move {
            self.with_reset(async {
                let mut conn = self.connection().await?;
                let count: u64 = self
                    .script
                    .key(key)
                    .arg(window.as_secs().max(1))
                    .invoke_async(&mut conn)
                    .await?;
                Ok(count)
            })
            .await
        }
        .boxed()
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        async move {
            self.with_reset(async {
                let mut conn = self.connection().await?;
                let _: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok(())
            })
            .await
        }
        .boxed()
    }

    fn kind(&self) -> &'static str {
        "redis"
    }
}
