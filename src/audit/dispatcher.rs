//! Non-blocking audit dispatch.
//!
//! Records are handed to the background task set and delivered after the
//! caller already has its response. Delivery is best-effort: failures are
//! logged and dropped, never retried.

use std::time::Duration;

use tokio::sync::oneshot;

use crate::audit::record::AuditRecord;
use crate::audit::sink::AuditSink;
use crate::config::AuditConfig;
use crate::lifecycle::tasks::{BackgroundTasks, DrainOutcome};
use crate::observability::metrics;

/// Completion signal of a dispatched record.
#[derive(Debug)]
pub struct Delivered(Option<oneshot::Receiver<()>>);

#[derive(Debug, Clone)]
pub struct AuditDispatcher {
    sink: AuditSink,
    tasks: BackgroundTasks,
    enabled: bool,
    drain_timeout: Duration,
}

impl AuditDispatcher {
    pub fn new(config: &AuditConfig, sink: AuditSink) -> Self {
        Self {
            sink,
            tasks: BackgroundTasks::new("audit", config.max_in_flight),
            enabled: config.enabled,
            drain_timeout: Duration::from_secs(config.drain_timeout_secs),
        }
    }

    /// Build from config; records are only logged when no sink URL is set.
    pub fn from_config(config: &AuditConfig) -> Result<Self, crate::audit::SinkError> {
        let sink = match config.sink_url.as_deref() {
            Some(url) => AuditSink::http(url, Duration::from_secs(config.timeout_secs))?,
            None => AuditSink::Log,
        };
        Ok(Self::new(config, sink))
    }

    /// Queue a record for delivery. Never blocks, never fails the caller.
    pub fn dispatch(&self, record: AuditRecord) -> Delivered {
        self.dispatch_after(Delivered(None), record)
    }

    /// Queue `record` to be delivered once `previous` has been attempted,
    /// keeping the phases of one request in order at the sink.
    pub fn dispatch_after(&self, previous: Delivered, record: AuditRecord) -> Delivered {
        if !self.enabled {
            return Delivered(None);
        }

        let sink = self.sink.clone();
        let (done_tx, done_rx) = oneshot::channel();
        let accepted = self.tasks.spawn(async move {
            if let Some(previous) = previous.0 {
                // Err means the previous task was dropped; deliver anyway.
                let _ = previous.await;
            }
            if let Err(e) = sink.deliver(&record).await {
                tracing::warn!(
                    trace_id = %record.trace_id,
                    event_type = ?record.event_type,
                    error = %e,
                    "Audit delivery failed"
                );
            }
            let _ = done_tx.send(());
        });

        if accepted {
            Delivered(Some(done_rx))
        } else {
            metrics::record_audit_dropped();
            Delivered(None)
        }
    }

    pub async fn drain(&self) -> DrainOutcome {
        self.tasks.drain(self.drain_timeout).await
    }
}
