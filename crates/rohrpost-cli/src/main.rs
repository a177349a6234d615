//! # rohrpost
//!
//! Command-line pub/sub client.
//!
//! ## Usage
//!
//! ```bash
//! # Publish lines typed on stdin as `<topic> [json]`
//! ROHRPOST_URL=http://push.example.com/connect rohrpost
//!
//! # Run with a config file
//! ROHRPOST_CONFIG=/path/to/rohrpost.toml rohrpost
//!
//! # Publish one message and exit
//! echo 'a.ping {"foo": "bar"}' | rohrpost
//! ```

mod config;
mod metrics;
mod session;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Stdout carries payloads, logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rohrpost=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = config::Config::load()?;

    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            tracing::error!("Failed to start metrics server: {:#}", e);
        }
    }
    metrics::init_metrics();

    session::run(config).await
}
