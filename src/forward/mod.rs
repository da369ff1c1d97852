//! Forwarding engine.
//!
//! # Data Flow
//! ```text
//! pipeline.rs
//!     → Forwarder::build_request (URI rewrite, header hygiene, identity headers)
//!     → buffered.rs  (bounded timeout, full body collected)
//!     → streaming.rs (head within timeout, then line relay until either side leaves)
//! ```
//!
//! # Design Decisions
//! - One shared pooled client for all upstreams
//! - Transport failures map to `UpstreamUnavailable` in one place
//! - Upstream error statuses are responses, not errors, and are relayed verbatim

pub mod buffered;
pub mod streaming;

use std::error::Error as StdError;
use std::time::Duration;

use axum::{
    body::Body,
    http::{request::Parts, HeaderValue, Request},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::error::{GatewayError, GatewayResult};
use crate::http::request::X_REQUEST_ID;
use crate::routing::Route;
use crate::security::headers::{forwardable_request_headers, X_FROM_GATEWAY, X_USER_ID, X_USER_ROLE};
use crate::security::Identity;

pub use buffered::UpstreamResponse;
pub use streaming::RelayEnd;

/// Shared upstream HTTP client.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
}

impl Forwarder {
    pub fn new(connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build(connector);

        Self { client }
    }

    /// Rebuild the inbound request against the route's upstream.
    pub fn build_request(
        route: &Route,
        parts: &Parts,
        body: Body,
        trace_id: &str,
        identity: Option<&Identity>,
    ) -> GatewayResult<Request<Body>> {
        let uri = route.upstream_uri(parts.uri.path_and_query())?;

        let mut headers = forwardable_request_headers(&parts.headers);
        headers.insert(X_FROM_GATEWAY, HeaderValue::from_static("true"));
        headers.insert(
            X_REQUEST_ID,
            HeaderValue::from_str(trace_id)
                .map_err(|_| GatewayError::BadRequest("Invalid request id".to_string()))?,
        );

        if let Some(identity) = identity {
            let subject = HeaderValue::from_str(&identity.subject)
                .map_err(|_| GatewayError::Unauthenticated("Invalid token".to_string()))?;
            let role = HeaderValue::from_str(&identity.role)
                .map_err(|_| GatewayError::Unauthenticated("Invalid token".to_string()))?;
            headers.insert(X_USER_ID, subject);
            headers.insert(X_USER_ROLE, role);
        }

        let mut request = Request::builder()
            .method(parts.method.clone())
            .uri(uri)
            .body(body)
            .map_err(|e| GatewayError::Internal(format!("failed to build upstream request: {}", e)))?;
        *request.headers_mut() = headers;

        Ok(request)
    }

    pub(crate) fn client(&self) -> &Client<HttpConnector, Body> {
        &self.client
    }
}

/// Render an error and all of its sources as one message.
pub(crate) fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

pub(crate) fn transport_error(route: &Route, err: &(dyn StdError + 'static)) -> GatewayError {
    let message = error_chain(err);
    tracing::error!(route = %route.name, upstream = %route.upstream(), error = %message, "Upstream unreachable");
    GatewayError::UpstreamUnavailable { message, timed_out: false }
}

pub(crate) fn timeout_error(route: &Route, after: Duration) -> GatewayError {
    tracing::error!(route = %route.name, upstream = %route.upstream(), timeout = ?after, "Upstream timed out");
    GatewayError::UpstreamUnavailable {
        message: format!("upstream did not respond within {}s", after.as_secs()),
        timed_out: true,
    }
}
