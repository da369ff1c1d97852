//! Event-stream relay.
//!
//! # Responsibilities
//! - Open the upstream stream, bounding only the wait for the response head
//! - Relay newline-delimited events to the caller as they arrive
//! - Stop reading upstream as soon as the caller goes away
//!
//! # Design Decisions
//! - A bounded channel sits between upstream and caller; a slow caller
//!   applies backpressure to the upstream read
//! - Lines are relayed byte-for-byte, blank separator lines included
//! - Dropping the upstream body closes its connection

use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderValue, Request},
    response::Response,
};
use futures_util::{Stream, StreamExt};
use hyper::body::Incoming;
use tokio::sync::mpsc;

use crate::error::GatewayResult;
use crate::forward::{timeout_error, transport_error, Forwarder, UpstreamResponse};
use crate::routing::Route;
use crate::security::headers::relay_response_headers;

/// Events buffered between upstream and caller.
const RELAY_BUFFER: usize = 32;

/// Longest partial line held back waiting for its newline.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Why a relay stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnd {
    /// Upstream finished the stream.
    UpstreamClosed,
    /// Caller disconnected; upstream was released.
    ClientDisconnected,
    /// Upstream read failed mid-stream.
    UpstreamFailed(String),
    /// Gateway is shutting down.
    Shutdown,
}

impl RelayEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayEnd::UpstreamClosed => "upstream_closed",
            RelayEnd::ClientDisconnected => "client_disconnected",
            RelayEnd::UpstreamFailed(_) => "upstream_failed",
            RelayEnd::Shutdown => "shutdown",
        }
    }
}

/// Result of opening an upstream stream.
pub enum OpenedStream {
    /// Upstream accepted; `body` yields the event stream.
    Live { headers: HeaderMap, body: Incoming },
    /// Upstream answered with a non-success status, relayed as a plain response.
    Refused(UpstreamResponse),
}

impl Forwarder {
    /// Send a stream request. Only the wait for the response head is bounded.
    pub async fn open_stream(
        &self,
        route: &Route,
        request: Request<Body>,
        head_timeout: Duration,
    ) -> GatewayResult<OpenedStream> {
        let response = match tokio::time::timeout(head_timeout, self.client().request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(transport_error(route, &e)),
            Err(_) => return Err(timeout_error(route, head_timeout)),
        };

        let (parts, body) = response.into_parts();
        if parts.status.is_success() {
            return Ok(OpenedStream::Live {
                headers: parts.headers,
                body,
            });
        }

        let body = match tokio::time::timeout(head_timeout, axum::body::to_bytes(Body::new(body), usize::MAX)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(transport_error(route, &e)),
            Err(_) => return Err(timeout_error(route, head_timeout)),
        };

        Ok(OpenedStream::Refused(UpstreamResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        }))
    }
}

/// Relay `upstream` to `tx` one line at a time until either side ends.
pub async fn relay_lines<S, E>(upstream: S, tx: mpsc::Sender<Bytes>) -> RelayEnd
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    relay_lines_capped(upstream, tx, MAX_LINE_BYTES).await
}

/// Like [`relay_lines`], but a partial line reaching `max_line` bytes is
/// passed on as is instead of growing further.
async fn relay_lines_capped<S, E>(upstream: S, tx: mpsc::Sender<Bytes>, max_line: usize) -> RelayEnd
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut upstream = pin!(upstream);
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let next = tokio::select! {
            _ = tx.closed() => return RelayEnd::ClientDisconnected,
            next = upstream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                pending.extend_from_slice(&chunk);
                while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    if tx.send(Bytes::from(line)).await.is_err() {
                        return RelayEnd::ClientDisconnected;
                    }
                }
                if pending.len() >= max_line {
                    let partial = std::mem::take(&mut pending);
                    if tx.send(Bytes::from(partial)).await.is_err() {
                        return RelayEnd::ClientDisconnected;
                    }
                }
            }
            Some(Err(e)) => return RelayEnd::UpstreamFailed(e.to_string()),
            None => {
                // Unterminated trailing data still belongs to the caller.
                if !pending.is_empty() && tx.send(Bytes::from(pending)).await.is_err() {
                    return RelayEnd::ClientDisconnected;
                }
                return RelayEnd::UpstreamClosed;
            }
        }
    }
}

/// Caller-facing response fed by `rx`.
pub fn event_stream_response(upstream_headers: &HeaderMap, rx: mpsc::Receiver<Bytes>) -> Response {
    let chunks = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
    });

    let mut response = Response::new(Body::from_stream(chunks));
    let headers = response.headers_mut();
    relay_response_headers(upstream_headers, headers);
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// Spawn the relay task for a live stream and return the response to send.
///
/// The relay also ends when `stop` resolves. `on_end` runs once, on the
/// relay task, after the upstream is released.
pub fn spawn_relay<S, F>(headers: &HeaderMap, body: Incoming, stop: S, on_end: F) -> Response
where
    S: Future<Output = ()> + Send + 'static,
    F: FnOnce(RelayEnd) + Send + 'static,
{
    let (tx, rx) = mpsc::channel(RELAY_BUFFER);

    tokio::spawn(async move {
        let end = tokio::select! {
            end = relay_lines(Body::new(body).into_data_stream(), tx) => end,
            _ = stop => RelayEnd::Shutdown,
        };
        on_end(end);
    });

    event_stream_response(headers, rx)
}
