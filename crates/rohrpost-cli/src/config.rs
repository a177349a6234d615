//! Client configuration.
//!
//! Configuration can be loaded from:
//! - The file named by `ROHRPOST_CONFIG`
//! - A TOML file at one of the default paths
//! - Environment variables (`ROHRPOST_URL`)

use anyhow::{Context, Result};
use rohrpost_core::{BackoffConfig, ClientConfig};
use rohrpost_transport::{WebSocketConfig, DEFAULT_RECONNECT_CLOSE_CODE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Contact URL used to negotiate an endpoint.
    #[serde(default = "default_url")]
    pub url: String,

    /// Topics whose payloads are printed to stdout.
    #[serde(default)]
    pub subscribe: Vec<String>,

    /// Reconnect backoff.
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// WebSocket connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Endpoint negotiation request timeout in milliseconds.
    #[serde(default = "default_negotiate_timeout")]
    pub negotiate_timeout_ms: u64,

    /// Path appended to the negotiated endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Close code the server uses to ask for an immediate reconnect.
    #[serde(default = "default_reconnect_close_code")]
    pub reconnect_close_code: u16,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Exporter port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_url() -> String {
    std::env::var("ROHRPOST_URL").unwrap_or_default()
}

fn default_connect_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_negotiate_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_ws_path() -> String {
    "/websocket".to_string()
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_reconnect_close_code() -> u16 {
    DEFAULT_RECONNECT_CLOSE_CODE
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            subscribe: Vec::new(),
            backoff: BackoffConfig::default(),
            transport: TransportConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            negotiate_timeout_ms: default_negotiate_timeout(),
            websocket_path: default_ws_path(),
            max_message_size: default_max_message_size(),
            reconnect_close_code: default_reconnect_close_code(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if `ROHRPOST_CONFIG` names a file that cannot be read.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("ROHRPOST_CONFIG") {
            let expanded = shellexpand::tilde(&path);
            return Self::from_file(expanded.as_ref());
        }

        let config_paths = [
            "rohrpost.toml",
            "/etc/rohrpost/rohrpost.toml",
            "~/.config/rohrpost/rohrpost.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Settings for the core client.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.url.clone()).with_backoff(self.backoff)
    }

    /// Settings for the WebSocket transport.
    #[must_use]
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig {
            path: self.transport.websocket_path.clone(),
            max_message_size: self.transport.max_message_size,
            connect_timeout: Duration::from_millis(self.transport.connect_timeout_ms),
            reconnect_close_code: self.transport.reconnect_close_code,
        }
    }

    /// Timeout for the negotiation request.
    #[must_use]
    pub fn negotiate_timeout(&self) -> Duration {
        Duration::from_millis(self.transport.negotiate_timeout_ms)
    }
}
