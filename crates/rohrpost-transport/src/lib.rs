//! # rohrpost-transport
//!
//! The collaborators a rohrpost client drives, behind small async traits:
//!
//! - **Negotiator** - resolves a contact URL into the endpoint to connect to
//! - **Transport** - opens a duplex connection to that endpoint
//! - **Connection** - the open/message/close/error signals plus send/close
//!
//! The default features provide an HTTP negotiator (reqwest) and a WebSocket
//! transport (tokio-tungstenite). Anything else, such as an in-memory transport
//! for tests, only has to implement the traits.
//!
//! ```rust,ignore
//! use rohrpost_transport::{Connection, TransportEvent};
//!
//! async fn pump(mut conn: Box<dyn Connection>) {
//!     while let TransportEvent::Message(text) = conn.recv().await {
//!         // Process text
//!     }
//! }
//! ```

pub mod negotiate;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use negotiate::{NegotiationFailure, Negotiator};
pub use traits::{Connection, ConnectionId, Transport, TransportError, TransportEvent};

#[cfg(feature = "http")]
pub use negotiate::HttpNegotiator;

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketTransport, DEFAULT_RECONNECT_CLOSE_CODE};
