//! Metrics collection and exposition.
//!
//! # Metrics
//! - `broker_requests_total` (counter): routed requests by outcome
//! - `broker_bootstraps_total` (counter): bootstrap attempts by result
//! - `broker_tunnels_registered` (gauge): registered tenants
//! - `broker_active_connections` (gauge): open client connections

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Count one routing decision (`tenant`, `control`, `no_host`, `unknown_tenant`, ...).
pub fn record_request(outcome: &'static str) {
    counter!("broker_requests_total", "outcome" => outcome).increment(1);
}

/// Count one bootstrap attempt (`ok`, `invalid`, `unauthorized`, `failed`).
pub fn record_bootstrap(result: &'static str) {
    counter!("broker_bootstraps_total", "result" => result).increment(1);
}

pub fn set_tunnel_count(count: usize) {
    gauge!("broker_tunnels_registered").set(count as f64);
}

pub fn set_active_connections(count: u64) {
    gauge!("broker_active_connections").set(count as f64);
}
