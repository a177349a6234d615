//! # rohrpost-core
//!
//! A client for topic-based pub/sub over a persistent duplex connection that
//! keeps itself connected:
//!
//! - **Negotiation** - before every attempt the contact URL is asked which
//!   endpoint to use
//! - **Session handshake** - a client-chosen token, confirmed by the server,
//!   identifies the client across reconnects
//! - **Outbound queue** - publishes made while unconfirmed are held and sent
//!   in order once the session opens
//! - **Backoff** - failures are retried with exponential backoff and full
//!   jitter until a ceiling is reached
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Client                           │
//! │   publish / on / once / on_open / close / state          │
//! └──────────────┬───────────────────────────▲───────────────┘
//!                │ commands                  │ state (watch)
//!                ▼                           │
//! ┌──────────────────────────────────────────┴───────────────┐
//! │                     Driver (one task)                    │
//! │  ┌───────────────────┐      ┌──────────────────────────┐ │
//! │  │ ConnectionManager │─────▶│ Negotiator / Transport   │ │
//! │  │ (state machine)   │◀─────│ retry timer              │ │
//! │  └─────────┬─────────┘      └──────────────────────────┘ │
//! │            ▼                                             │
//! │      TopicRouter ──▶ subscriber callbacks                │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use rohrpost_core::{Client, ClientConfig};
//! use rohrpost_transport::{HttpNegotiator, WebSocketTransport};
//!
//! let client = Client::connect(
//!     ClientConfig::new("http://push.example.com/connect"),
//!     HttpNegotiator::new()?,
//!     WebSocketTransport::default(),
//! )?;
//!
//! client.on("a.pong", |data| println!("pong {data}"));
//! client.on_open(|| println!("open"));
//! client.publish("a.ping", &serde_json::json!({ "foo": "bar" }));
//! ```

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod queue;
pub mod router;
pub mod session;

pub use backoff::{BackoffDecision, BackoffPolicy};
pub use client::Client;
pub use config::{BackoffConfig, ClientConfig};
pub use error::{ConfigError, ConnectionFailure};
pub use manager::{Action, CloseReason, ConnectionManager, ConnectionState, Input};
pub use queue::{OutboundQueue, QueueEntry};
pub use router::{Callback, Signal, TopicRouter};
pub use session::SessionHandshake;
