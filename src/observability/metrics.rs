//! Metrics collection and exposition.
//!
//! # Metrics
//! - `runtime_requests_total` (counter): requests by method, status, stage
//! - `runtime_request_duration_seconds` (histogram): latency by stage
//!
//! # Design Decisions
//! - `stage` is the pipeline stage that answered, or `fallback`
//! - The exporter is only installed when an address is configured

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Latency buckets in seconds, tuned for page renders.
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(DURATION_BUCKETS)?
        .install()?;

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one finished request.
pub fn record_request(method: &str, status: u16, stage: &'static str, start: Instant) {
    counter!(
        "runtime_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "stage" => stage
    )
    .increment(1);

    histogram!("runtime_request_duration_seconds", "stage" => stage)
        .record(start.elapsed().as_secs_f64());
}
