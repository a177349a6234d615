//! Client configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Reconnect backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// First retry interval in milliseconds.
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,

    /// Interval at or beyond which the client gives up.
    #[serde(default = "default_ceiling_ms")]
    pub ceiling_ms: u64,
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Contact URL asked for an endpoint before every connection attempt.
    pub url: String,

    /// Reconnect backoff.
    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_initial_ms() -> u64 {
    500
}

fn default_ceiling_ms() -> u64 {
    60_000
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_initial_ms(),
            ceiling_ms: default_ceiling_ms(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration with default backoff.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backoff: BackoffConfig::default(),
        }
    }

    /// Replace the backoff settings.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Check the configuration before anything is spawned.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is missing, unparsable or not http(s), or
    /// if the initial backoff interval is zero.
    pub fn validate(&self) -> Result<Url, ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingUrl);
        }

        let url = Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
        }

        if self.backoff.initial_ms == 0 {
            return Err(ConfigError::InvalidBackoff("initial_ms must be positive"));
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backoff() {
        let backoff = BackoffConfig::default();
        assert_eq!(backoff.initial_ms, 500);
        assert_eq!(backoff.ceiling_ms, 60_000);
    }

    #[test]
    fn test_validate_accepts_http() {
        let config = ClientConfig::new("https://push.example.com/connect");
        let url = config.validate().unwrap();
        assert_eq!(url.host_str(), Some("push.example.com"));
    }

    #[test]
    fn test_validate_rejects_bad_targets() {
        assert_eq!(
            ClientConfig::new("  ").validate(),
            Err(ConfigError::MissingUrl)
        );
        assert!(matches!(
            ClientConfig::new("not a url").validate(),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert_eq!(
            ClientConfig::new("ftp://example.com").validate(),
            Err(ConfigError::UnsupportedScheme("ftp".into()))
        );
    }

    #[test]
    fn test_validate_rejects_zero_backoff() {
        let config = ClientConfig::new("http://localhost").with_backoff(BackoffConfig {
            initial_ms: 0,
            ceiling_ms: 1000,
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBackoff(_))
        ));
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            url = "http://localhost:9000/connect"

            [backoff]
            ceiling_ms = 8000
        "#;

        let config: ClientConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.url, "http://localhost:9000/connect");
        assert_eq!(config.backoff.initial_ms, 500);
        assert_eq!(config.backoff.ceiling_ms, 8000);
    }
}
