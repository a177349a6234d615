//! Endpoint negotiation.
//!
//! A client is configured with a contact URL, not a socket address. Before
//! every connection attempt it asks the contact URL which endpoint to use,
//! because the server may route each attempt differently.

use async_trait::async_trait;
use thiserror::Error;

/// Status reported when no response was received at all.
pub const STATUS_UNREACHABLE: u16 = 0;

/// Status reported when the contact URL does not exist (yet).
pub const STATUS_NOT_FOUND: u16 = 404;

/// A failed negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Negotiation failed with status {status}: {message}")]
pub struct NegotiationFailure {
    /// HTTP-style status; `0` when the server was unreachable.
    pub status: u16,
    /// Human-readable detail.
    pub message: String,
}

impl NegotiationFailure {
    /// Create a failure with an explicit status.
    #[must_use]
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Create a failure for a request that never got a response.
    #[must_use]
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(STATUS_UNREACHABLE, message)
    }

    /// Whether the client should back off and try again.
    ///
    /// Only unreachable (`0`) and not-found (`404`) are retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.status, STATUS_UNREACHABLE | STATUS_NOT_FOUND)
    }
}

/// Resolves a contact URL into a transport endpoint.
#[async_trait]
pub trait Negotiator: Send + Sync {
    /// Resolve `contact_url` into the endpoint to open.
    async fn resolve(&self, contact_url: &str) -> Result<String, NegotiationFailure>;
}

#[cfg(feature = "http")]
pub use http::HttpNegotiator;

#[cfg(feature = "http")]
mod http {
    use super::{NegotiationFailure, Negotiator};
    use crate::traits::TransportError;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::time::Duration;
    use tracing::debug;

    /// Default negotiation request timeout.
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Negotiates over plain HTTP: `GET <contact_url>` answers with the
    /// endpoint URL as its body.
    #[derive(Debug, Clone)]
    pub struct HttpNegotiator {
        client: reqwest::Client,
    }

    impl HttpNegotiator {
        /// Create a negotiator with the default request timeout.
        ///
        /// # Errors
        ///
        /// Returns an error if the HTTP client cannot be built.
        pub fn new() -> Result<Self, TransportError> {
            Self::with_timeout(DEFAULT_TIMEOUT)
        }

        /// Create a negotiator with a custom request timeout.
        ///
        /// # Errors
        ///
        /// Returns an error if the HTTP client cannot be built.
        pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| TransportError::Other(format!("Failed to build HTTP client: {e}")))?;
            Ok(Self { client })
        }

        /// Wrap an existing reqwest client.
        #[must_use]
        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    #[async_trait]
    impl Negotiator for HttpNegotiator {
        async fn resolve(&self, contact_url: &str) -> Result<String, NegotiationFailure> {
            let response = self
                .client
                .get(contact_url)
                .send()
                .await
                .map_err(|e| NegotiationFailure::unreachable(e.to_string()))?;

            let status = response.status();
            if status != StatusCode::OK {
                return Err(NegotiationFailure::new(
                    status.as_u16(),
                    format!("Unexpected response status {status}"),
                ));
            }

            let body = response
                .text()
                .await
                .map_err(|e| NegotiationFailure::unreachable(e.to_string()))?;

            let endpoint = body.trim();
            if endpoint.is_empty() {
                return Err(NegotiationFailure::new(
                    status.as_u16(),
                    format!("Couldn't get connection URL from {contact_url}"),
                ));
            }

            debug!(contact = %contact_url, endpoint = %endpoint, "Negotiated endpoint");
            Ok(endpoint.to_string())
        }
    }
}
