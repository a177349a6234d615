//! Transport abstraction traits for rohrpost.
//!
//! These traits define the interface a duplex transport must provide so the
//! client can stay transport-agnostic.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Identifier of one opened connection, used in log fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// A fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("conn_{:016x}", rand::random::<u64>()))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why opening, using or closing a connection failed.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection is already gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Opening took longer than the configured timeout.
    #[error("Connect timed out")]
    Timeout,

    /// The endpoint refused or the handshake failed.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// A message could not be written.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// A signal delivered by an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A raw text message arrived.
    Message(String),
    /// The connection closed.
    Closed {
        /// Close code reported by the peer or the transport.
        code: u16,
        /// Whether the close handshake completed.
        was_clean: bool,
    },
    /// The connection failed.
    Error(String),
}

impl TransportEvent {
    /// Whether this event ends the connection.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Message(_))
    }
}

/// A transport that can open client connections.
///
/// A successful [`Transport::open`] is the transport's "open" signal; a failed
/// one is reported to the client as a transport error.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to a negotiated endpoint.
    async fn open(&self, endpoint: &str) -> Result<Box<dyn Connection>, TransportError>;

    /// Get the transport name (e.g., "websocket").
    fn name(&self) -> &'static str;
}

/// An open duplex connection.
///
/// After [`Connection::recv`] returns a terminal event the connection is done
/// and must not be polled again.
#[async_trait]
pub trait Connection: Send {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Wait for the next signal from the connection.
    ///
    /// Must be cancel-safe: dropping the future must not lose a message.
    async fn recv(&mut self) -> TransportEvent;

    /// Send a raw text message.
    async fn send(&mut self, raw: String) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;
}
