//! Metrics collection and exposition.
//!
//! # Metrics
//! - `edge_outbound_attempts_total` (counter): attempts by destination, outcome
//! - `edge_outbound_retries_total` (counter): backoff sleeps by destination
//! - `edge_circuit_opened_total` / `edge_circuit_rejected_total` (counters)
//! - `edge_rate_limited_total` (counter): by command class
//! - `edge_duplicate_events_total` (counter)
//! - `edge_idempotency_total` (counter): by outcome
//! - `edge_webhook_events_total` (counter): by ack status
//! - `edge_webhook_duration_seconds` (histogram)
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users
//!   and tests pay nothing
//! - Prometheus exposition runs on its own listener

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_attempt(destination: &str, outcome: &'static str) {
    counter!(
        "edge_outbound_attempts_total",
        "destination" => destination.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_retry(destination: &str) {
    counter!("edge_outbound_retries_total", "destination" => destination.to_string()).increment(1);
}

pub fn record_circuit_opened(destination: &str) {
    counter!("edge_circuit_opened_total", "destination" => destination.to_string()).increment(1);
}

pub fn record_circuit_rejected(destination: &str) {
    counter!("edge_circuit_rejected_total", "destination" => destination.to_string()).increment(1);
}

pub fn record_rate_limited(command_class: &str) {
    counter!("edge_rate_limited_total", "command_class" => command_class.to_string()).increment(1);
}

pub fn record_duplicate_event() {
    counter!("edge_duplicate_events_total").increment(1);
}

pub fn record_idempotency(outcome: &'static str) {
    counter!("edge_idempotency_total", "outcome" => outcome).increment(1);
}

pub fn record_webhook(status: &'static str, start: Instant) {
    counter!("edge_webhook_events_total", "status" => status).increment(1);
    histogram!("edge_webhook_duration_seconds").record(start.elapsed().as_secs_f64());
}
