//! Gateway error taxonomy and its HTTP mapping.
//!
//! Every variant short-circuits the pipeline. Upstream responses carrying an
//! error status are not represented here: they are relayed verbatim.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors produced by the request pipeline.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing, malformed, badly signed or expired credential.
    #[error("{0}")]
    Unauthenticated(String),

    /// Valid credential whose role is not allowed on the route.
    #[error("{0}")]
    Forbidden(String),

    /// Quota exceeded for the caller on this route.
    #[error("Rate limit exceeded, retry in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    /// Upstream could not be reached or did not answer in time.
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable { message: String, timed_out: bool },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Request body larger than the configured limit.
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Gateway-side fault (bad configuration, unbuildable request).
    #[error("Internal gateway error: {0}")]
    Internal(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::UpstreamUnavailable { timed_out: true, .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable label for logs, metrics and audit metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Unauthenticated(_) => "unauthenticated",
            GatewayError::Forbidden(_) => "forbidden",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::UpstreamUnavailable { .. } => "upstream_unavailable",
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::PayloadTooLarge(_) => "payload_too_large",
            GatewayError::Internal(_) => "internal",
        }
    }

    /// True for failures on the gateway side of the call, as opposed to
    /// outcomes decided about the caller (auth, quota, bad input).
    pub fn is_gateway_fault(&self) -> bool {
        matches!(
            self,
            GatewayError::UpstreamUnavailable { .. } | GatewayError::Internal(_)
        )
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.to_string();

        match self {
            GatewayError::RateLimited { retry_after_secs } => {
                let body = json!({ "detail": detail, "retry_after": retry_after_secs });
                let mut response = (status, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                response
            }
            _ => (status, Json(json!({ "detail": detail }))).into_response(),
        }
    }
}
