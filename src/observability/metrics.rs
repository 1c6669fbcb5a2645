//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): requests by method, status
//! - `relay_request_duration_seconds` (histogram): handshake/response latency
//! - `relay_rooms_created_total` (counter)
//! - `relay_rooms_reclaimed_total` (counter)
//! - `relay_sessions_opened_total` (counter)
//! - `relay_sessions_closed_total` (counter): by reason
//! - `relay_messages_relayed_total` (counter): successful peer deliveries
//! - `relay_delivery_failures_total` (counter)
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Prometheus exporter serves its own HTTP listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and start its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("relay_requests_total", &labels).increment(1);
    histogram!("relay_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_room_created() {
    counter!("relay_rooms_created_total").increment(1);
}

pub fn record_rooms_reclaimed(count: usize) {
    counter!("relay_rooms_reclaimed_total").increment(count as u64);
}

pub fn record_session_opened() {
    counter!("relay_sessions_opened_total").increment(1);
}

pub fn record_session_closed(reason: &'static str) {
    counter!("relay_sessions_closed_total", "reason" => reason).increment(1);
}

pub fn record_broadcast(delivered: usize, failed: usize) {
    counter!("relay_messages_relayed_total").increment(delivered as u64);
    if failed > 0 {
        counter!("relay_delivery_failures_total").increment(failed as u64);
    }
}
