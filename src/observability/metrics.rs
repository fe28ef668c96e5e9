//! Metrics collection and exposition.
//!
//! # Metrics
//! - `portal_http_requests_total` (counter): requests by method, status
//! - `portal_http_request_duration_seconds` (histogram): latency distribution
//! - `portal_upstream_attempts_total` (counter): fallback attempts by group, outcome
//! - `portal_upstream_endpoint_health` (gauge): 1=healthy, 0=unhealthy
//! - `portal_upstream_cache_total` (counter): response cache hits/misses
//! - `portal_image_cache_total` (counter): image cache hits/misses/errors
//! - `portal_image_bytes_uploaded_total` (counter)
//! - `portal_rate_limited_total` (counter)
//! - `portal_chat_ws_connections` (gauge)
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter, so
//! tests never need a recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!("portal_http_requests_total", "method" => method.to_string(), "status" => status.clone())
        .increment(1);
    histogram!("portal_http_request_duration_seconds", "method" => method.to_string(), "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_attempt(group: &str, outcome: &'static str) {
    counter!("portal_upstream_attempts_total", "group" => group.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_endpoint_health(endpoint: &str, healthy: bool) {
    gauge!("portal_upstream_endpoint_health", "endpoint" => endpoint.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_upstream_cache(group: &str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("portal_upstream_cache_total", "group" => group.to_string(), "result" => result)
        .increment(1);
}

pub fn record_image_cache(result: &'static str) {
    counter!("portal_image_cache_total", "result" => result).increment(1);
}

pub fn record_image_upload(bytes: usize) {
    counter!("portal_image_bytes_uploaded_total").increment(bytes as u64);
}

pub fn record_rate_limited() {
    counter!("portal_rate_limited_total").increment(1);
}

pub fn record_ws_connections(delta: f64) {
    gauge!("portal_chat_ws_connections").increment(delta);
}
