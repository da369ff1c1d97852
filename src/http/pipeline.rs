//! Request pipeline.
//!
//! # Data Flow
//! ```text
//! request
//!     → trace id, client IP, body read once
//!     → credential verified (pure) ─→ `request` audit record
//!     → rate limit (subject, else client IP)
//!     → route lookup → access policy
//!     → forward (buffered | streaming)
//!     → analytics + terminal audit record (background)
//!     → response with X-Request-ID
//! ```
//!
//! # Design Decisions
//! - Every short-circuit is a `GatewayError`; the forwarder never runs for them
//! - Side effects are queued, never awaited on the response path
//! - Upstream error statuses are relayed as responses, not errors

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::{header, request::Parts, HeaderValue, Method},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};

use crate::audit::AuditContext;
use crate::error::{GatewayError, GatewayResult};
use crate::forward::streaming::{spawn_relay, OpenedStream};
use crate::forward::{Forwarder, RelayEnd, UpstreamResponse};
use crate::http::request::{client_ip, resolve_trace_id, BufferedBody, X_REQUEST_ID};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::routing::{ForwardMode, Route, UNMATCHED_ROUTE};
use crate::security::{Identity, Requirement};

/// Limiter key for callers with neither identity nor address.
const UNKNOWN_CLIENT: &str = "unknown";

/// What the forwarding step produced.
enum Outcome {
    Buffered(UpstreamResponse),
    Stream(Response),
}

/// Everything the pipeline learned about one request.
struct RequestContext<'a> {
    parts: &'a Parts,
    path: &'a str,
    trace_id: &'a str,
    route: Option<Arc<Route>>,
    limiter_key: String,
    verified: GatewayResult<Identity>,
}

/// Main gateway handler: every proxied request goes through here.
pub async fn handle(State(state): State<AppState>, request: axum::extract::Request) -> Response {
    let started = Instant::now();
    let (parts, body) = request.into_parts();

    let trace_id = resolve_trace_id(&parts.headers);
    let path = parts.uri.path().to_string();
    let method = parts.method.clone();
    let client_ip = client_ip(
        &parts.headers,
        &parts.extensions,
        state.config.listener.trust_forwarded_for,
    );

    let mut audit = AuditContext::new(
        &trace_id,
        &state.config.service_name,
        &method,
        &path,
        client_ip.clone(),
        state.config.audit.max_body_chars,
    );

    let body = BufferedBody::read(body, state.config.listener.max_body_bytes).await;
    if let Ok(body) = &body {
        audit.capture_request_body(body.bytes());
    }

    // Verified before admission so the limiter can key on the subject.
    let verified = state.verifier.authenticate(&parts.headers);
    if let Ok(identity) = &verified {
        audit.set_user(&identity.subject);
    }
    let request_delivered = state.audit.dispatch(audit.request_record());

    let route = state.router.match_path(&path);
    let route_name = route.as_ref().map(|r| r.name.clone()).unwrap_or_else(|| UNMATCHED_ROUTE.to_string());

    tracing::debug!(trace_id = %trace_id, method = %method, path = %path, route = %route_name, "Request received");

    let limiter_key = match &verified {
        Ok(identity) => identity.subject.clone(),
        Err(_) => client_ip.unwrap_or_else(|| UNKNOWN_CLIENT.to_string()),
    };

    let outcome = match body {
        Ok(body) => {
            let ctx = RequestContext {
                parts: &parts,
                path: &path,
                trace_id: &trace_id,
                route,
                limiter_key,
                verified,
            };
            run(&state, ctx, body).await
        }
        Err(e) => Err(e),
    };

    let elapsed = started.elapsed();
    let (mut response, status, record) = match outcome {
        Ok(Outcome::Buffered(upstream)) => {
            let status = upstream.status.as_u16();
            let record = audit.response_record(status, elapsed, Some(&upstream.body), Map::new());
            (upstream.into_response(), status, record)
        }
        Ok(Outcome::Stream(response)) => {
            let status = response.status().as_u16();
            let mut metadata = Map::new();
            metadata.insert("streaming".to_string(), Value::Bool(true));
            let record = audit.response_record(status, elapsed, None, metadata);
            (response, status, record)
        }
        Err(e) => {
            let status = e.status().as_u16();
            let record = if e.is_gateway_fault() {
                if let GatewayError::UpstreamUnavailable { timed_out, .. } = &e {
                    metrics::record_upstream_error(&route_name, *timed_out);
                }
                tracing::error!(trace_id = %trace_id, path = %path, error = %e, "Request failed");
                audit.error_record(&e.to_string(), e.kind(), elapsed)
            } else {
                tracing::info!(trace_id = %trace_id, path = %path, status, reason = e.kind(), "Request rejected");
                let mut metadata = Map::new();
                metadata.insert("rejected".to_string(), Value::from(e.kind()));
                metadata.insert("detail".to_string(), Value::from(e.to_string()));
                audit.response_record(status, elapsed, None, metadata)
            };
            (e.into_response(), status, record)
        }
    };

    state.analytics.record(&route_name, status);
    let _ = state.audit.dispatch_after(request_delivered, record);
    metrics::record_request(method.as_str(), status, &route_name, elapsed);

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }

    tracing::info!(
        trace_id = %trace_id,
        method = %method,
        path = %path,
        status,
        route = %route_name,
        duration_ms = elapsed.as_millis() as u64,
        "Request completed"
    );
    response
}

/// Admission, authorization and forwarding, in that order.
async fn run(state: &AppState, ctx: RequestContext<'_>, body: BufferedBody) -> GatewayResult<Outcome> {
    let method = &ctx.parts.method;

    let route_name = ctx.route.as_ref().map(|r| r.name.as_str());
    state.limiter.check(&ctx.limiter_key, method, ctx.path, route_name).await?;

    if !is_relayable(method) {
        return Err(GatewayError::BadRequest(format!("Method {} not supported", method)));
    }

    let route = ctx
        .route
        .ok_or_else(|| GatewayError::NotFound(format!("No route for {}", ctx.path)))?;

    let identity = match state.policy.requirement(method, ctx.path) {
        // Anonymous routes still propagate a valid identity when one was sent.
        Requirement::Public => ctx.verified.ok(),
        Requirement::Roles(_) | Requirement::Deny => {
            let identity = ctx.verified?;
            state.policy.authorize(method, ctx.path, &identity)?;
            Some(identity)
        }
    };

    let content_type = ctx
        .parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    match route.mode_for(method, ctx.path, content_type) {
        ForwardMode::Buffered { timeout } => {
            let request = Forwarder::build_request(&route, ctx.parts, body.to_body(), ctx.trace_id, identity.as_ref())?;
            let response = state.forwarder.forward_buffered(&route, request, timeout).await?;
            Ok(Outcome::Buffered(response))
        }
        ForwardMode::Streaming { head_timeout } => {
            check_stream_params(&route, ctx.parts)?;
            let request = Forwarder::build_request(&route, ctx.parts, body.to_body(), ctx.trace_id, identity.as_ref())?;

            match state.forwarder.open_stream(&route, request, head_timeout).await? {
                OpenedStream::Refused(response) => Ok(Outcome::Buffered(response)),
                OpenedStream::Live { headers, body } => {
                    metrics::stream_opened();
                    tracing::info!(trace_id = %ctx.trace_id, route = %route.name, "Stream opened");

                    let trace_id = ctx.trace_id.to_string();
                    let route_name = route.name.clone();
                    let stop = state.shutdown.signalled();
                    let response = spawn_relay(&headers, body, stop, move |end| {
                        metrics::stream_closed();
                        match end {
                            RelayEnd::UpstreamFailed(error) => {
                                tracing::warn!(trace_id = %trace_id, route = %route_name, error = %error, "Stream relay failed")
                            }
                            other => {
                                tracing::info!(trace_id = %trace_id, route = %route_name, reason = other.as_str(), "Stream closed")
                            }
                        }
                    });
                    Ok(Outcome::Stream(response))
                }
            }
        }
    }
}

/// Stream routes require their query parameters to be present and non-empty.
fn check_stream_params(route: &Route, parts: &Parts) -> GatewayResult<()> {
    if route.stream_required_params.is_empty() {
        return Ok(());
    }

    let Query(params) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map_err(|e| GatewayError::BadRequest(format!("Invalid query string: {}", e)))?;

    for name in &route.stream_required_params {
        if params.get(name).map_or(true, |v| v.trim().is_empty()) {
            return Err(GatewayError::BadRequest(format!("{} required", name)));
        }
    }
    Ok(())
}

/// Methods the gateway relays; anything else is rejected before routing.
pub fn is_relayable(method: &Method) -> bool {
    !matches!(*method, Method::CONNECT | Method::TRACE)
}
