//! Audit record model.

use std::time::Duration;

use axum::http::Method;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Suffix appended to captured text cut at the character limit.
pub const TRUNCATION_MARKER: &str = "...(truncated)";

/// Stand-in for bodies that are not valid UTF-8.
pub const NON_TEXT_PLACEHOLDER: &str = "<non-decodable>";

/// Lifecycle phase a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Request,
    Response,
    Error,
}

/// One immutable audit entry, shipped to the sink as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub trace_id: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub event_type: EventType,
    pub operation: String,
    pub user_id: Option<String>,
    pub client_ip: Option<String>,
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub request_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Best-effort text rendering of a body, cut to `max_chars` characters.
pub fn truncate_text(bytes: &[u8], max_chars: usize) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(_) => return NON_TEXT_PLACEHOLDER.to_string(),
    };

    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// `/api/sbom/upload` → `api.sbom.upload`.
pub fn operation_name(path: &str) -> String {
    path.trim_matches('/').replace('/', ".")
}

/// Per-request facts shared by every record of one trace.
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub trace_id: String,
    pub service: String,
    pub method: Method,
    pub path: String,
    pub user_id: Option<String>,
    pub client_ip: Option<String>,
    pub request_body: Option<String>,
    max_body_chars: usize,
}

impl AuditContext {
    pub fn new(
        trace_id: &str,
        service: &str,
        method: &Method,
        path: &str,
        client_ip: Option<String>,
        max_body_chars: usize,
    ) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            service: service.to_string(),
            method: method.clone(),
            path: path.to_string(),
            user_id: None,
            client_ip,
            request_body: None,
            max_body_chars,
        }
    }

    /// Capture a truncated copy of the request body; the buffer itself is untouched.
    pub fn capture_request_body(&mut self, body: &[u8]) {
        if !body.is_empty() {
            self.request_body = Some(truncate_text(body, self.max_body_chars));
        }
    }

    pub fn set_user(&mut self, user_id: &str) {
        self.user_id = Some(user_id.to_string());
    }

    fn record(&self, event_type: EventType) -> AuditRecord {
        AuditRecord {
            trace_id: self.trace_id.clone(),
            timestamp: Utc::now(),
            service: self.service.clone(),
            event_type,
            operation: operation_name(&self.path),
            user_id: self.user_id.clone(),
            client_ip: self.client_ip.clone(),
            method: self.method.to_string(),
            path: self.path.clone(),
            status_code: None,
            duration_ms: None,
            request_body: self.request_body.clone(),
            response_body: None,
            metadata: Map::new(),
        }
    }

    pub fn request_record(&self) -> AuditRecord {
        self.record(EventType::Request)
    }

    pub fn response_record(
        &self,
        status: u16,
        elapsed: Duration,
        response_body: Option<&[u8]>,
        metadata: Map<String, Value>,
    ) -> AuditRecord {
        let mut record = self.record(EventType::Response);
        record.status_code = Some(status);
        record.duration_ms = Some(elapsed.as_millis() as u64);
        record.response_body = response_body
            .filter(|b| !b.is_empty())
            .map(|b| truncate_text(b, self.max_body_chars));
        record.metadata = metadata;
        record
    }

    /// Terminal record for a gateway-side failure; carries no status code.
    pub fn error_record(&self, message: &str, kind: &str, elapsed: Duration) -> AuditRecord {
        let mut record = self.record(EventType::Error);
        record.duration_ms = Some(elapsed.as_millis() as u64);
        record.metadata.insert("error".to_string(), Value::from(message));
        record.metadata.insert("error_kind".to_string(), Value::from(kind));
        record
    }
}
