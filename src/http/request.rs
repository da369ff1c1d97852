//! Request context extraction.
//!
//! # Responsibilities
//! - Resolve the trace id (caller-supplied or fresh UUID v4)
//! - Resolve the client IP
//! - Read the body exactly once into a shared buffer
//!
//! # Design Decisions
//! - The buffered body is never mutated; forwarding and audit capture read the same bytes
//! - `X-Forwarded-For` is only honored when configured

use std::error::Error as StdError;
use std::net::SocketAddr;

use axum::{
    body::{Body, Bytes},
    extract::ConnectInfo,
    http::{Extensions, HeaderMap},
};
use http_body_util::LengthLimitError;
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_TRACE_ID: &str = "x-trace-id";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Longest caller-supplied trace id accepted.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace id from `X-Request-ID`, then `X-Trace-ID`, else a new UUID.
pub fn resolve_trace_id(headers: &HeaderMap) -> String {
    [X_REQUEST_ID, X_TRACE_ID]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|id| !id.is_empty() && id.len() <= MAX_TRACE_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Caller address as text, or `None` when the transport does not expose it.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions, trust_forwarded_for: bool) -> Option<String> {
    if trust_forwarded_for {
        let forwarded = headers
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return Some(ip.to_string());
        }
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

fn exceeds_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// Request body read once and shared by every consumer.
#[derive(Debug, Clone, Default)]
pub struct BufferedBody {
    bytes: Bytes,
}

impl BufferedBody {
    pub async fn read(body: Body, limit: usize) -> GatewayResult<Self> {
        let bytes = axum::body::to_bytes(body, limit).await.map_err(|e| {
            if exceeds_limit(&e) {
                GatewayError::PayloadTooLarge(format!("Request body exceeds {} bytes", limit))
            } else {
                GatewayError::BadRequest(format!("Failed to read request body: {}", e))
            }
        })?;
        Ok(Self { bytes })
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// A fresh body over the same buffer.
    pub fn to_body(&self) -> Body {
        if self.bytes.is_empty() {
            Body::empty()
        } else {
            Body::from(self.bytes.clone())
        }
    }
}
