//! Audit record delivery.

use std::time::Duration;

use thiserror::Error;

use crate::audit::record::AuditRecord;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("audit sink request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("audit sink answered {0}")]
    Status(u16),
}

/// Where audit records go.
#[derive(Debug, Clone)]
pub enum AuditSink {
    /// JSON POST to the external audit service over a short-timeout client.
    Http { client: reqwest::Client, url: String },
    /// Structured log line only.
    Log,
}

impl AuditSink {
    pub fn http(url: &str, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(AuditSink::Http {
            client,
            url: url.to_string(),
        })
    }

    pub async fn deliver(&self, record: &AuditRecord) -> Result<(), SinkError> {
        match self {
            AuditSink::Http { client, url } => {
                let response = client.post(url).json(record).send().await?;
                if !response.status().is_success() {
                    return Err(SinkError::Status(response.status().as_u16()));
                }
                Ok(())
            }
            AuditSink::Log => {
                tracing::info!(
                    target: "audit",
                    trace_id = %record.trace_id,
                    event_type = ?record.event_type,
                    method = %record.method,
                    path = %record.path,
                    status = ?record.status_code,
                    duration_ms = ?record.duration_ms,
                    "Audit record"
                );
                Ok(())
            }
        }
    }
}
