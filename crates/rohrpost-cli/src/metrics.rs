//! Prometheus export for the client metrics.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Describe the client metrics to the installed recorder.
pub fn init_metrics() {
    rohrpost_core::metrics::describe();
    info!("Metrics initialized");
}

/// Install the Prometheus recorder and start its HTTP listener.
///
/// # Errors
///
/// Returns an error if the listener address is invalid or a recorder is
/// already installed.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{port}")
        .parse()
        .context("Invalid metrics listen address")?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}
