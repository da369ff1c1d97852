//! Bounded fire-and-forget task set.
//!
//! Side effects (audit delivery, analytics counters) run here so they never
//! hold up a response. In-flight work is capped by a semaphore; work offered
//! while saturated is dropped. At shutdown `drain` waits for in-flight work
//! up to a deadline and abandons the rest.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct BackgroundTasks {
    name: &'static str,
    permits: Arc<Semaphore>,
    capacity: u32,
}

/// Outcome of a shutdown drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Completed,
    /// Deadline passed with this many tasks still running.
    Abandoned(usize),
}

impl BackgroundTasks {
    pub fn new(name: &'static str, max_in_flight: usize) -> Self {
        let capacity = max_in_flight.clamp(1, u32::MAX as usize) as u32;
        Self {
            name,
            permits: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
        }
    }

    /// Run `task` in the background. Returns `false` if it was dropped
    /// because the set is saturated or closed.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(tasks = self.name, "Background task set saturated, dropping work");
                return false;
            }
        };

        tokio::spawn(async move {
            task.await;
            drop(permit);
        });
        true
    }

    pub fn in_flight(&self) -> usize {
        self.capacity as usize - self.permits.available_permits()
    }

    /// Stop accepting work and wait up to `timeout` for in-flight tasks.
    pub async fn drain(&self, timeout: Duration) -> DrainOutcome {
        let outcome = match tokio::time::timeout(timeout, self.permits.acquire_many(self.capacity)).await {
            Ok(Ok(_all)) => DrainOutcome::Completed,
            Ok(Err(_closed)) => DrainOutcome::Completed,
            Err(_) => DrainOutcome::Abandoned(self.in_flight()),
        };
        self.permits.close();

        match outcome {
            DrainOutcome::Completed => tracing::info!(tasks = self.name, "Background tasks drained"),
            DrainOutcome::Abandoned(n) => {
                tracing::warn!(tasks = self.name, abandoned = n, "Background tasks abandoned at shutdown")
            }
        }
        outcome
    }
}
