//! In-process counter store.
//!
//! Correct for a single gateway instance only; admission decisions are not
//! shared with other replicas.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::store::WindowCount;

/// Sweep expired entries every this many increments.
const SWEEP_EVERY: u64 = 1024;

#[derive(Debug, Clone, Copy)]
struct Slot {
    count: u64,
    expires_at: Option<Instant>,
}

/// A thread-safe counter map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, Slot>>,
    ops: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry lock makes increment and expiry one atomic step per key.
    pub fn incr_with_expiry(&self, key: &str, window: Duration) -> WindowCount {
        self.maybe_sweep();
        let now = Instant::now();

        let mut slot = self.inner.entry(key.to_string()).or_insert(Slot {
            count: 0,
            expires_at: None,
        });
        let live = slot.expires_at.is_some_and(|at| at > now);
        if !live {
            slot.count = 0;
            slot.expires_at = Some(now + window);
        }
        slot.count += 1;

        let expires_at = slot.expires_at.unwrap_or(now);
        WindowCount {
            count: slot.count,
            ttl: expires_at.saturating_duration_since(now),
        }
    }

    pub fn incr(&self, key: &str) -> u64 {
        let mut slot = self.inner.entry(key.to_string()).or_insert(Slot {
            count: 0,
            expires_at: None,
        });
        slot.count += 1;
        slot.count
    }

    /// Current value of a counter, if present and live.
    pub fn get(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        self.inner
            .get(key)
            .filter(|slot| slot.expires_at.map_or(true, |at| at > now))
            .map(|slot| slot.count)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    fn maybe_sweep(&self) {
        if self.ops.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY != SWEEP_EVERY - 1 {
            return;
        }
        let now = Instant::now();
        self.inner.retain(|_, slot| slot.expires_at.map_or(true, |at| at > now));
        tracing::debug!(slots = self.len(), "Swept expired counters");
    }
}
