//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): relay requests by response status
//! - `relay_upstream_errors_total` (counter): terminal upstream errors by kind
//! - `relay_chunks_total` / `relay_bytes_total` (counters): relayed payload
//! - `relay_active_streams` (gauge): streams currently open downstream
//! - `relay_stream_duration_seconds` (histogram): stream lifetime
//!
//! Without an installed exporter every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Count a `/chat` request by the status it was answered with.
pub fn record_request(status: u16) {
    metrics::counter!("relay_requests_total", "status" => status.to_string()).increment(1);
}

pub fn record_upstream_error(kind: &'static str) {
    metrics::counter!("relay_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn record_chunk(len: usize) {
    metrics::counter!("relay_chunks_total").increment(1);
    metrics::counter!("relay_bytes_total").increment(len as u64);
}

/// Track one open downstream stream until the guard drops.
pub fn stream_opened() -> StreamGuard {
    metrics::gauge!("relay_active_streams").increment(1.0);
    StreamGuard {
        started: Instant::now(),
    }
}

#[derive(Debug)]
pub struct StreamGuard {
    started: Instant,
}

impl StreamGuard {
    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        metrics::gauge!("relay_active_streams").decrement(1.0);
        metrics::histogram!("relay_stream_duration_seconds")
            .record(self.started.elapsed().as_secs_f64());
    }
}
