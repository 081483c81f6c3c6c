//! Metrics collection and exposition.
//!
//! # Metrics
//! - `devserver_requests_total` (counter): requests by source, status
//! - `devserver_request_duration_seconds` (histogram): latency by source
//! - `devserver_cache_events_total` (counter): hit, miss, write, write_error
//! - `devserver_livereload_broadcasts_total` (counter): reload/alert pushes
//! - `devserver_livereload_clients` (gauge): open live-reload sockets
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished request. `source` names the stage that answered.
pub fn record_request(source: &'static str, status: u16, start: Instant) {
    metrics::counter!(
        "devserver_requests_total",
        "source" => source,
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("devserver_request_duration_seconds", "source" => source)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_cache_event(event: &'static str) {
    metrics::counter!("devserver_cache_events_total", "event" => event).increment(1);
}

pub fn record_broadcast(command: &'static str, clients: usize) {
    metrics::counter!("devserver_livereload_broadcasts_total", "command" => command)
        .increment(clients as u64);
}

pub fn record_live_clients(count: usize) {
    metrics::gauge!("devserver_livereload_clients").set(count as f64);
}
