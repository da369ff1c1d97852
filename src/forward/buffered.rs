//! Buffered forwarding: one request, one complete response.

use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
};

use crate::error::GatewayResult;
use crate::forward::{timeout_error, transport_error, Forwarder};
use crate::routing::Route;
use crate::security::headers::relay_response_headers;

/// A fully collected upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        relay_response_headers(&self.headers, response.headers_mut());
        response
    }
}

impl Forwarder {
    /// Send `request` and collect the whole response within `timeout`.
    pub async fn forward_buffered(
        &self,
        route: &Route,
        request: Request<Body>,
        timeout: Duration,
    ) -> GatewayResult<UpstreamResponse> {
        let exchange = async {
            let response = self
                .client()
                .request(request)
                .await
                .map_err(|e| transport_error(route, &e))?;

            let (parts, body) = response.into_parts();
            let body = axum::body::to_bytes(Body::new(body), usize::MAX)
                .await
                .map_err(|e| transport_error(route, &e))?;

            Ok(UpstreamResponse {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(route, timeout)),
        }
    }
}
