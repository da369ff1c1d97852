//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): rejections by quota bucket
//! - `gateway_upstream_errors_total` (counter): unreachable/timed-out upstreams by route
//! - `gateway_audit_dropped_total` (counter): records dropped when the dispatcher is saturated
//! - `gateway_active_streams` (gauge): event streams currently relayed
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, route: &str, elapsed: Duration) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_rate_limited(bucket: &str) {
    metrics::counter!("gateway_rate_limited_total", "route" => bucket.to_string()).increment(1);
}

pub fn record_upstream_error(route: &str, timed_out: bool) {
    let kind = if timed_out { "timeout" } else { "unreachable" };
    metrics::counter!("gateway_upstream_errors_total", "route" => route.to_string(), "kind" => kind)
        .increment(1);
}

pub fn record_audit_dropped() {
    metrics::counter!("gateway_audit_dropped_total").increment(1);
}

pub fn stream_opened() {
    metrics::gauge!("gateway_active_streams").increment(1.0);
}

pub fn stream_closed() {
    metrics::gauge!("gateway_active_streams").decrement(1.0);
}
