//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, tunnels, connections)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by kind (`connect`/`http`) and status
//! - `proxy_tunnels_active` (gauge): open CONNECT tunnels
//! - `proxy_tunnel_bytes_total` (counter): bytes relayed by direction
//! - `proxy_active_connections` (gauge): current client connection count
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The exporter is only installed when enabled in config

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Count a handled request.
pub fn record_request(kind: &'static str, status: u16) {
    counter!(
        "proxy_requests_total",
        "kind" => kind,
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn tunnel_opened() {
    gauge!("proxy_tunnels_active").increment(1.0);
}

pub fn tunnel_closed() {
    gauge!("proxy_tunnels_active").decrement(1.0);
}

/// Count bytes carried by one tunnel direction.
pub fn record_tunnel_bytes(direction: &'static str, bytes: u64) {
    counter!("proxy_tunnel_bytes_total", "direction" => direction).increment(bytes);
}

pub fn connection_opened() {
    gauge!("proxy_active_connections").increment(1.0);
}

pub fn connection_closed() {
    gauge!("proxy_active_connections").decrement(1.0);
}
