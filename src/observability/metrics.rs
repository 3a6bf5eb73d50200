//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method and status
//! - `http_request_duration_seconds` (histogram): latency distribution
//! - `scheduler_job_runs_total` (counter): job runs by name and outcome
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels kept low-cardinality (no paths, no user ids)

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed HTTP request.
pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("http_request_duration_seconds", "method" => method.to_string())
        .record(elapsed.as_secs_f64());
}

/// Record one scheduler job run.
pub fn record_job_run(name: &str, outcome: &'static str) {
    metrics::counter!(
        "scheduler_job_runs_total",
        "job" => name.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
