//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, status
//! - `http_request_duration_seconds` (histogram): latency distribution
//! - `http_rate_limited_total` (counter): requests rejected by the rate limiter
//!
//! # Design Decisions
//! - Without an installed recorder every update is a no-op
//! - The Prometheus listener only starts when `METRICS_ADDRESS` is set

use std::net::SocketAddr;
use std::time::Instant;

use axum::http::Method;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| e.to_string())?;

    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests handled");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "Latency distribution for HTTP requests"
    );
    metrics::describe_counter!(
        "http_rate_limited_total",
        "Requests rejected by the rate limiter"
    );

    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

pub fn record_request(method: &Method, status: u16, start: Instant) {
    let method = method.to_string();
    let status = status.to_string();
    metrics::counter!("http_requests_total", "method" => method.clone(), "status" => status.clone())
        .increment(1);
    metrics::histogram!("http_request_duration_seconds", "method" => method, "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    metrics::counter!("http_rate_limited_total").increment(1);
}
