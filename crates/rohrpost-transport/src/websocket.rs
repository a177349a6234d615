//! WebSocket transport implementation.
//!
//! This module provides a client WebSocket transport using tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use rohrpost_protocol::RECONNECT_CLOSE_CODE;

use crate::traits::{Connection, ConnectionId, Transport, TransportError, TransportEvent};

/// Close code used when the peer's close frame carried no code.
const CLOSE_NO_STATUS: u16 = 1005;

/// Close code used when the socket went away without a close frame.
const CLOSE_ABNORMAL: u16 = 1006;

/// Default close code a WebSocket server sends to ask for a reconnect.
pub const DEFAULT_RECONNECT_CLOSE_CODE: u16 = 4100;

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Path appended to the negotiated endpoint to reach the raw socket.
    pub path: String,
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
    /// How long the TCP + WebSocket handshake may take.
    pub connect_timeout: Duration,
    /// Close code reported as [`RECONNECT_CLOSE_CODE`].
    ///
    /// Codes below 1000 are rejected by RFC 6455 and never arrive intact, so
    /// a WebSocket server signals "reconnect" with an application code
    /// (4000-4999) instead.
    pub reconnect_close_code: u16,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: "/websocket".to_string(),
            max_message_size: 64 * 1024, // 64 KB
            connect_timeout: Duration::from_secs(10),
            reconnect_close_code: DEFAULT_RECONNECT_CLOSE_CODE,
        }
    }
}

/// Derive the socket URL from a negotiated HTTP(S) endpoint.
///
/// - `http://host:8080` -> `ws://host:8080/websocket`
/// - `https://host` -> `wss://host/websocket`
#[must_use]
pub fn websocket_url(endpoint: &str, path: &str) -> String {
    let base = if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        endpoint.to_string()
    } else {
        // Assume ws:// if no scheme
        format!("ws://{endpoint}")
    };

    format!("{}{}", base.trim_end_matches('/'), path)
}

/// WebSocket transport.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }

    /// Get the transport configuration.
    #[must_use]
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn Connection>, TransportError> {
        let url = websocket_url(endpoint, &self.config.path);
        debug!("Connect to websocket via {}", url);

        let (stream, _response) =
            tokio::time::timeout(self.config.connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(|e| TransportError::ConnectFailed(format!("{url}: {e}")))?;

        let conn = WebSocketConnection::new(stream, &self.config);
        debug!(connection = %conn.id, url = %url, "WebSocket handshake completed");
        Ok(Box::new(conn))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A client WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    max_message_size: usize,
    reconnect_close_code: u16,
}

impl WebSocketConnection {
    fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>, config: &WebSocketConfig) -> Self {
        Self {
            id: ConnectionId::generate(),
            stream,
            max_message_size: config.max_message_size,
            reconnect_close_code: config.reconnect_close_code,
        }
    }

    fn close_code(&self, code: u16) -> u16 {
        if code == self.reconnect_close_code {
            RECONNECT_CLOSE_CODE
        } else {
            code
        }
    }

    fn check_size(&self, len: usize) -> Option<TransportEvent> {
        if len > self.max_message_size {
            warn!(
                connection = %self.id,
                "Message too large: {} bytes (max: {})", len, self.max_message_size
            );
            return Some(TransportEvent::Error(format!(
                "Message of {len} bytes exceeds maximum {}",
                self.max_message_size
            )));
        }
        None
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = self.check_size(text.len()) {
                        return event;
                    }
                    return TransportEvent::Message(text);
                }
                Some(Ok(Message::Binary(data))) => {
                    if let Some(event) = self.check_size(data.len()) {
                        return event;
                    }
                    match String::from_utf8(data) {
                        Ok(text) => return TransportEvent::Message(text),
                        Err(_) => warn!(connection = %self.id, "Dropping non UTF-8 binary message"),
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    // Pongs are queued by tungstenite itself
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map_or(CLOSE_NO_STATUS, |f| self.close_code(u16::from(f.code)));
                    debug!(connection = %self.id, code, "Received close frame");
                    return TransportEvent::Closed {
                        code,
                        was_clean: true,
                    };
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    debug!(connection = %self.id, "Connection closed");
                    return TransportEvent::Closed {
                        code: CLOSE_NO_STATUS,
                        was_clean: true,
                    };
                }
                Some(Err(e)) => {
                    return TransportEvent::Error(e.to_string());
                }
                None => {
                    debug!(connection = %self.id, "WebSocket stream ended");
                    return TransportEvent::Closed {
                        code: CLOSE_ABNORMAL,
                        was_clean: false,
                    };
                }
            }
        }
    }

    async fn send(&mut self, raw: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(raw))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Other(format!("Failed to close: {e}"))),
        }
    }
}
