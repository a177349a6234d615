//! Error types for rohrpost-core.
//!
//! Only [`ConfigError`] ever reaches a caller. Every [`ConnectionFailure`] is
//! handled inside the connection state machine and surfaces as log output.

use thiserror::Error;

/// Rejected client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No contact URL was configured.
    #[error("Missing connection URL")]
    MissingUrl,

    /// The contact URL does not parse.
    #[error("Invalid connection URL {url:?}: {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The contact URL is not http(s).
    #[error("Unsupported URL scheme {0:?}, expected http or https")]
    UnsupportedScheme(String),

    /// The backoff settings cannot produce a retry schedule.
    #[error("Invalid backoff: {0}")]
    InvalidBackoff(&'static str),
}

/// Why a connection attempt did not (or no longer) produce an open session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionFailure {
    /// Endpoint negotiation failed.
    #[error("Negotiation failed with status {status}: {message}")]
    Negotiation {
        /// Status reported by the negotiator (`0` = unreachable).
        status: u16,
        /// Detail.
        message: String,
        /// Whether the status is one that gets retried.
        retryable: bool,
    },

    /// The server's reply did not confirm our session token.
    #[error("Handshake was not successful ({received} != {expected})")]
    HandshakeMismatch {
        /// What the server should have sent.
        expected: String,
        /// What it did send.
        received: String,
    },

    /// The transport failed to open or failed while open.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The transport closed without a clean close handshake.
    #[error("Connection closed uncleanly (code {0})")]
    UncleanClose(u16),

    /// The transport closed cleanly for no reason we know how to handle.
    #[error("Unhandled close event (code {0})")]
    UnhandledClose(u16),

    /// The server asked us to reconnect right away.
    #[error("Server requested reconnect")]
    ReconnectDirective,

    /// An inbound envelope could not be decoded.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The reconnect backoff reached its ceiling.
    #[error("Couldn't reconnect, giving up")]
    BackoffExhausted,
}

impl ConnectionFailure {
    /// Short label used for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Negotiation { .. } => "negotiation",
            Self::HandshakeMismatch { .. } => "handshake_mismatch",
            Self::Transport(_) => "transport",
            Self::UncleanClose(_) => "unclean_close",
            Self::UnhandledClose(_) => "unhandled_close",
            Self::ReconnectDirective => "reconnect_directive",
            Self::MalformedEnvelope(_) => "malformed_envelope",
            Self::BackoffExhausted => "backoff_exhausted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_messages() {
        let failure = ConnectionFailure::HandshakeMismatch {
            expected: "ok:abc".into(),
            received: "nope".into(),
        };
        assert_eq!(
            failure.to_string(),
            "Handshake was not successful (nope != ok:abc)"
        );
        assert_eq!(failure.kind(), "handshake_mismatch");
        assert_eq!(ConnectionFailure::UncleanClose(1006).kind(), "unclean_close");
    }
}
