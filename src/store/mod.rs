//! Shared counter store.
//!
//! # Data Flow
//! ```text
//! rate_limit.rs ──incr_with_expiry──┐
//!                                   ├─→ CounterStore ─→ Redis (shared by all instances)
//! analytics.rs  ──incr──────────────┘                 └→ Memory (single instance, tests)
//! ```
//!
//! # Design Decisions
//! - Every mutation is one atomic operation; the gateway never reads then writes
//! - Expiry is attached in the same operation as the first increment
//! - Handles are cheap to clone and shared by all components

pub mod memory;
pub mod redis;

use std::time::Duration;

use thiserror::Error;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Errors from the counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Counter state right after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Count including this increment.
    pub count: u64,
    /// Time left until the counter expires.
    pub ttl: Duration,
}

/// Handle to the configured counter backend.
#[derive(Clone)]
pub enum CounterStore {
    Redis(RedisStore),
    Memory(MemoryStore),
}

impl CounterStore {
    /// Connect to Redis when a URL is configured, otherwise use process memory.
    pub async fn connect(redis_url: Option<&str>) -> Result<Self, StoreError> {
        match redis_url {
            Some(url) => Ok(CounterStore::Redis(RedisStore::connect(url).await?)),
            None => {
                tracing::warn!("No redis_url configured; counters are local to this instance");
                Ok(CounterStore::Memory(MemoryStore::new()))
            }
        }
    }

    /// Atomically increment `key`, starting a `window`-long expiry on the first hit.
    pub async fn incr_with_expiry(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        match self {
            CounterStore::Redis(store) => store.incr_with_expiry(key, window).await,
            CounterStore::Memory(store) => Ok(store.incr_with_expiry(key, window)),
        }
    }

    /// Atomically increment a counter that never expires.
    pub async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        match self {
            CounterStore::Redis(store) => store.incr(key).await,
            CounterStore::Memory(store) => Ok(store.incr(key)),
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            CounterStore::Redis(_) => "redis",
            CounterStore::Memory(_) => "memory",
        }
    }

    /// Release the store at shutdown.
    pub async fn close(self) {
        match self {
            CounterStore::Redis(store) => store.close(),
            CounterStore::Memory(store) => store.clear(),
        }
        tracing::info!("Counter store closed");
    }
}

impl std::fmt::Debug for CounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CounterStore").field(&self.backend()).finish()
    }
}
