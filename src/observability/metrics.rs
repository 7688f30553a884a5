//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): inbound requests by method, status
//! - `gateway_request_duration_seconds` (histogram): inbound latency
//! - `gateway_upstream_calls_total` (counter): resilient calls by upstream, outcome
//! - `gateway_upstream_retries_total` (counter): retries scheduled per upstream
//! - `gateway_circuit_transitions_total` (counter): breaker transitions by upstream, from, to
//! - `gateway_circuit_state` (gauge): 0=closed, 1=open, 2=half-open

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "method" => method.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_upstream_call(upstream: &str, outcome: &'static str) {
    counter!(
        "gateway_upstream_calls_total",
        "upstream" => upstream.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_retry(upstream: &str) {
    counter!("gateway_upstream_retries_total", "upstream" => upstream.to_string()).increment(1);
}

pub fn record_circuit_transition(upstream: &str, from: CircuitState, to: CircuitState) {
    counter!(
        "gateway_circuit_transitions_total",
        "upstream" => upstream.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    set_circuit_state(upstream, to);
}

pub fn set_circuit_state(upstream: &str, state: CircuitState) {
    gauge!("gateway_circuit_state", "upstream" => upstream.to_string()).set(state.as_gauge());
}
