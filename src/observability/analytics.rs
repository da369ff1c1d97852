//! Per-route hit and status counters in the shared store.
//!
//! Keys are bounded by the route table: requests no route matched share
//! the `unmatched` counters.
//!
//! Write-only from the gateway's side and best-effort: updates run in the
//! background and store failures are logged and swallowed.

use std::time::Duration;

use crate::config::{AnalyticsConfig, StoreConfig};
use crate::lifecycle::tasks::{BackgroundTasks, DrainOutcome};
use crate::store::CounterStore;

#[derive(Debug, Clone)]
pub struct AnalyticsAggregator {
    store: CounterStore,
    tasks: BackgroundTasks,
    key_prefix: String,
    enabled: bool,
}

impl AnalyticsAggregator {
    pub fn new(config: &AnalyticsConfig, store_config: &StoreConfig, store: CounterStore) -> Self {
        Self {
            store,
            tasks: BackgroundTasks::new("analytics", config.max_in_flight),
            key_prefix: store_config.key_prefix.clone(),
            enabled: config.enabled,
        }
    }

    pub fn hits_key(&self, route: &str) -> String {
        format!("{}:analytics:hits:{}", self.key_prefix, route)
    }

    pub fn status_key(&self, route: &str, status: u16) -> String {
        format!("{}:analytics:status:{}:{}", self.key_prefix, route, status)
    }

    /// Count one completed request. Never blocks the caller.
    pub fn record(&self, route: &str, status: u16) {
        if !self.enabled {
            return;
        }

        let store = self.store.clone();
        let hits = self.hits_key(route);
        let by_status = self.status_key(route, status);

        self.tasks.spawn(async move {
            for key in [hits, by_status] {
                if let Err(e) = store.incr(&key).await {
                    tracing::warn!(key = %key, error = %e, "Analytics update failed");
                }
            }
        });
    }

    pub async fn drain(&self, timeout: Duration) -> DrainOutcome {
        self.tasks.drain(timeout).await
    }
}
