//! # rohrpost-protocol
//!
//! Wire definitions shared by the rohrpost client and anything that speaks to it.
//!
//! A rohrpost connection carries two kinds of traffic:
//!
//! - **Handshake** - the raw session token sent right after the transport opens,
//!   answered by the server with `ok:<token>`. Neither side is enveloped.
//! - **Envelopes** - every message after confirmation is a JSON object with
//!   exactly two fields, `topic` and `data`.
//!
//! ## Example
//!
//! ```rust
//! use rohrpost_protocol::{codec, Envelope};
//! use serde_json::json;
//!
//! let envelope = Envelope::new("a.ping", json!({"foo": "bar"}));
//!
//! let encoded = codec::encode(&envelope).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(decoded.topic, "a.ping");
//! ```

pub mod codec;
pub mod envelope;
pub mod handshake;

pub use codec::{decode, encode, ProtocolError};
pub use envelope::Envelope;
pub use handshake::{confirmation_for, CONFIRMATION_PREFIX, RECONNECT_CLOSE_CODE};
