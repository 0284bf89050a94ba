//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_blocked_targets_total` (counter): denylist hits by reason
//! - `proxy_rewrites_total` (counter): response bodies by rewrite kind
//! - `proxy_cache_events_total` (counter): hit, miss, store, evict
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_blocked(reason: &'static str) {
    metrics::counter!("proxy_blocked_targets_total", "reason" => reason).increment(1);
}

pub fn record_rewrite(kind: &'static str) {
    metrics::counter!("proxy_rewrites_total", "kind" => kind).increment(1);
}

pub fn record_cache_event(event: &'static str) {
    metrics::counter!("proxy_cache_events_total", "event" => event).increment(1);
}
