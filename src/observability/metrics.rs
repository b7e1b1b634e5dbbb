//! Metrics collection and exposition.
//!
//! # Metrics
//! - `edge_requests_total` (counter): requests by method, status, domain
//! - `edge_request_duration_seconds` (histogram): latency distribution
//! - `edge_origin_attempts_total` (counter): origin attempts by domain, outcome
//! - `edge_probe_total` (counter): probe results by domain, outcome

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a finished request. `status` 0 means no response was produced.
pub fn record_request(method: &str, status: u16, domain: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("domain", domain.to_string()),
    ];
    counter!("edge_requests_total", &labels).increment(1);
    histogram!("edge_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

/// Record one attempt against an origin.
pub fn record_attempt(domain: &str, outcome: &'static str) {
    counter!("edge_origin_attempts_total", "domain" => domain.to_string(), "outcome" => outcome).increment(1);
}

/// Record one probe result.
pub fn record_probe(domain: &str, outcome: &'static str) {
    counter!("edge_probe_total", "domain" => domain.to_string(), "outcome" => outcome).increment(1);
}
