//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bare_http_tunnels_total` (counter): HTTP tunnel attempts by outcome
//! - `bare_socket_tunnels_total` (counter): WebSocket tunnel attempts by outcome
//! - `bare_relay_bytes_total` (counter): bytes relayed by the leg that closed first
//! - `bare_meta_entries` (gauge): live meta entries
//! - `bare_meta_expired_total` (counter): meta entries removed by the sweeper
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!("bare_http_tunnels_total", "HTTP tunnel attempts by outcome");
    describe_counter!("bare_socket_tunnels_total", "WebSocket tunnel attempts by outcome");
    describe_counter!("bare_relay_bytes_total", "Bytes relayed over WebSocket tunnels");
    describe_gauge!("bare_meta_entries", "Meta entries currently stored");
    describe_counter!("bare_meta_expired_total", "Meta entries expired by the sweeper");

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_http_tunnel(outcome: &'static str) {
    counter!("bare_http_tunnels_total", "outcome" => outcome).increment(1);
}

pub fn record_socket_tunnel(outcome: &'static str) {
    counter!("bare_socket_tunnels_total", "outcome" => outcome).increment(1);
}

pub fn record_relay_bytes(direction: &'static str, bytes: u64) {
    counter!("bare_relay_bytes_total", "direction" => direction).increment(bytes);
}

pub fn record_meta_entries(count: usize) {
    gauge!("bare_meta_entries").set(count as f64);
}

pub fn record_meta_expired(count: usize) {
    counter!("bare_meta_expired_total").increment(count as u64);
}
