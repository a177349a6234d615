//! The connection lifecycle state machine.
//!
//! [`ConnectionManager`] performs no I/O. It consumes [`Input`]s (collaborator
//! signals and caller requests) and answers with [`Action`]s for a driver to
//! execute. This keeps every transition testable without sockets or timers;
//! see [`crate::client`] for the tokio driver.
//!
//! ```text
//! Idle ─▶ Negotiating ─▶ HandshakePending ─▶ Open
//!              ▲  │                │          │
//!              │  ▼                ▼          ▼
//!              └─ BackoffWait ◀────┴──────────┘
//!
//! any ─▶ Closed { Requested }      BackoffWait ─▶ Closed { BackoffExhausted }
//! ```

use rand::rngs::StdRng;
use rand::SeedableRng;
use rohrpost_protocol::{codec, Envelope, RECONNECT_CLOSE_CODE};
use rohrpost_transport::NegotiationFailure;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::backoff::{BackoffDecision, BackoffPolicy};
use crate::config::ClientConfig;
use crate::error::ConnectionFailure;
use crate::metrics;
use crate::queue::OutboundQueue;
use crate::session::SessionHandshake;

/// Why a client reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The caller closed the client.
    Requested,
    /// Reconnecting failed until the backoff ceiling was reached.
    BackoffExhausted,
}

/// Lifecycle state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, not started.
    Idle,
    /// Resolving an endpoint or opening the transport.
    Negotiating,
    /// Transport open, session token sent, waiting for confirmation.
    HandshakePending,
    /// Session confirmed; publishes go straight to the transport.
    Open,
    /// Waiting out a backoff delay before negotiating again.
    BackoffWait,
    /// No transport and no retry scheduled; only `close` leaves this state.
    Disconnected,
    /// Terminal.
    Closed {
        /// What closed it.
        reason: CloseReason,
    },
}

impl ConnectionState {
    /// Whether the state is terminal.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    /// Whether a transport is currently attached.
    #[must_use]
    pub fn has_transport(&self) -> bool {
        matches!(self, Self::HandshakePending | Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Negotiating => write!(f, "negotiating"),
            Self::HandshakePending => write!(f, "handshake_pending"),
            Self::Open => write!(f, "open"),
            Self::BackoffWait => write!(f, "backoff_wait"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Closed {
                reason: CloseReason::Requested,
            } => write!(f, "closed"),
            Self::Closed {
                reason: CloseReason::BackoffExhausted,
            } => write!(f, "gave_up"),
        }
    }
}

/// Something that happened to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// The negotiator answered.
    Negotiated(Result<String, NegotiationFailure>),
    /// The transport opened.
    TransportOpened,
    /// The transport could not be opened.
    TransportFailed(String),
    /// A raw message arrived on the transport.
    Message(String),
    /// The transport closed.
    TransportClosed {
        /// Close code.
        code: u16,
        /// Whether the close handshake completed.
        was_clean: bool,
    },
    /// The open transport failed.
    TransportError(String),
    /// The scheduled backoff delay elapsed.
    RetryElapsed,
    /// The caller published a message.
    Publish {
        /// Topic.
        topic: String,
        /// Payload.
        data: Value,
    },
    /// The caller closed the client.
    Close,
}

/// Something the driver must do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Resolve the contact URL into an endpoint.
    Negotiate(String),
    /// Open a transport to the endpoint.
    OpenTransport(String),
    /// Send a raw message on the open transport.
    Send(String),
    /// Close the open transport.
    CloseTransport,
    /// Feed [`Input::RetryElapsed`] back after the delay.
    ScheduleRetry(Duration),
    /// Cancel the scheduled retry.
    CancelRetry,
    /// Decode and dispatch an inbound envelope.
    Route(String),
    /// Fire the one-shot open signal.
    EmitOpen,
}

/// The connection lifecycle of one client.
pub struct ConnectionManager {
    contact_url: String,
    state: ConnectionState,
    session: SessionHandshake,
    backoff: BackoffPolicy,
    queue: OutboundQueue,
    rng: StdRng,
    open_emitted: bool,
    last_failure: Option<ConnectionFailure>,
}

impl ConnectionManager {
    /// Create a manager with a random session token.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_parts(config, SessionHandshake::new(), StdRng::from_entropy())
    }

    /// Create a manager with an explicit session and jitter source.
    #[must_use]
    pub fn with_parts(config: &ClientConfig, session: SessionHandshake, rng: StdRng) -> Self {
        Self {
            contact_url: config.url.clone(),
            state: ConnectionState::Idle,
            session,
            backoff: BackoffPolicy::new(config.backoff),
            queue: OutboundQueue::new(),
            rng,
            open_emitted: false,
            last_failure: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The session token, stable across reconnects.
    #[must_use]
    pub fn session_id(&self) -> &str {
        self.session.token()
    }

    /// Whether the current connection has a confirmed session.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.session.is_confirmed()
    }

    /// Number of publishes waiting for confirmation.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Current backoff base interval.
    #[must_use]
    pub fn backoff_ms(&self) -> u64 {
        self.backoff.current_ms()
    }

    /// The most recent failure, if any.
    #[must_use]
    pub fn last_failure(&self) -> Option<&ConnectionFailure> {
        self.last_failure.as_ref()
    }

    /// Leave `Idle` and start negotiating.
    pub fn start(&mut self) -> Vec<Action> {
        if self.state != ConnectionState::Idle {
            return Vec::new();
        }
        self.negotiate()
    }

    /// Apply an input and return the actions it requires.
    pub fn handle(&mut self, input: Input) -> Vec<Action> {
        if self.state.is_closed() {
            match input {
                Input::TransportClosed { .. } => debug!("Closed connection"),
                Input::Publish { topic, .. } => {
                    debug!(topic = %topic, "Dropping publish on closed client")
                }
                other => debug!(input = ?other, "Ignoring input on closed client"),
            }
            return Vec::new();
        }

        match input {
            Input::Negotiated(result) => self.on_negotiated(result),
            Input::TransportOpened => self.on_transport_opened(),
            Input::TransportFailed(reason) => {
                if self.state != ConnectionState::Negotiating {
                    return Vec::new();
                }
                error!(error = %reason, "Failed to open transport");
                self.fail(ConnectionFailure::Transport(reason))
            }
            Input::Message(raw) => self.on_message(raw),
            Input::TransportClosed { code, was_clean } => self.on_transport_closed(code, was_clean),
            Input::TransportError(reason) => {
                if !self.state.has_transport() {
                    return Vec::new();
                }
                error!(error = %reason, "Transport error");
                self.session.reset();
                self.fail(ConnectionFailure::Transport(reason))
            }
            Input::RetryElapsed => {
                if self.state != ConnectionState::BackoffWait {
                    return Vec::new();
                }
                metrics::record_reconnect("backoff");
                self.negotiate()
            }
            Input::Publish { topic, data } => self.publish(topic, data),
            Input::Close => self.close(),
        }
    }

    fn negotiate(&mut self) -> Vec<Action> {
        self.state = ConnectionState::Negotiating;
        vec![Action::Negotiate(self.contact_url.clone())]
    }

    fn on_negotiated(&mut self, result: Result<String, NegotiationFailure>) -> Vec<Action> {
        if self.state != ConnectionState::Negotiating {
            return Vec::new();
        }

        match result {
            Ok(endpoint) => {
                debug!(endpoint = %endpoint, "Endpoint negotiated");
                vec![Action::OpenTransport(endpoint)]
            }
            Err(failure) if failure.is_retryable() => {
                warn!(status = failure.status, error = %failure.message, "Negotiation failed");
                self.fail(ConnectionFailure::Negotiation {
                    status: failure.status,
                    message: failure.message,
                    retryable: true,
                })
            }
            Err(failure) => {
                error!(status = failure.status, error = %failure.message, "Negotiation failed, not retrying");
                self.record_failure(ConnectionFailure::Negotiation {
                    status: failure.status,
                    message: failure.message,
                    retryable: false,
                });
                self.disconnect()
            }
        }
    }

    fn on_transport_opened(&mut self) -> Vec<Action> {
        if self.state != ConnectionState::Negotiating {
            return Vec::new();
        }

        self.state = ConnectionState::HandshakePending;
        self.session.reset();
        debug!(session = %self.session.token(), "Transport open, sending session token");
        vec![Action::Send(self.session.bootstrap_message())]
    }

    fn on_message(&mut self, raw: String) -> Vec<Action> {
        match self.state {
            ConnectionState::HandshakePending => {
                if self.session.confirm(&raw) {
                    self.on_confirmed()
                } else {
                    let failure = ConnectionFailure::HandshakeMismatch {
                        expected: self.session.expected_reply().to_string(),
                        received: raw,
                    };
                    warn!("{}", failure);
                    self.record_failure(failure);
                    Vec::new()
                }
            }
            ConnectionState::Open => vec![Action::Route(raw)],
            _ => {
                debug!(state = %self.state, "Ignoring message without a transport");
                Vec::new()
            }
        }
    }

    fn on_confirmed(&mut self) -> Vec<Action> {
        self.state = ConnectionState::Open;
        self.backoff.reset();
        metrics::record_handshake();
        info!(session = %self.session.token(), queued = self.queue.len(), "Session open");

        let mut actions: Vec<Action> = Vec::with_capacity(self.queue.len() + 1);
        let entries: Vec<_> = self.queue.drain().collect();
        for entry in entries {
            if let Some(raw) = encode(&entry.topic, entry.data) {
                actions.push(Action::Send(raw));
            }
        }
        metrics::set_queue_depth(0);

        if !self.open_emitted {
            self.open_emitted = true;
            actions.push(Action::EmitOpen);
        }
        actions
    }

    fn on_transport_closed(&mut self, code: u16, was_clean: bool) -> Vec<Action> {
        if !self.state.has_transport() {
            return Vec::new();
        }
        self.session.reset();

        if code == RECONNECT_CLOSE_CODE {
            info!(code, "Server requested reconnect");
            self.record_failure(ConnectionFailure::ReconnectDirective);
            metrics::record_reconnect("directive");
            self.negotiate()
        } else if !was_clean {
            self.fail(ConnectionFailure::UncleanClose(code))
        } else {
            let failure = ConnectionFailure::UnhandledClose(code);
            error!("{}", failure);
            self.record_failure(failure);
            self.disconnect()
        }
    }

    /// Rest without a transport or a retry; nothing queued can ever drain.
    fn disconnect(&mut self) -> Vec<Action> {
        self.state = ConnectionState::Disconnected;
        let dropped = self.queue.clear();
        if dropped > 0 {
            warn!(dropped, "Dropping unsent publishes, connection will not be retried");
        }
        metrics::set_queue_depth(0);
        Vec::new()
    }

    fn publish(&mut self, topic: String, data: Value) -> Vec<Action> {
        match self.state {
            ConnectionState::Open => {
                return encode(&topic, data).map(Action::Send).into_iter().collect();
            }
            ConnectionState::Disconnected => {
                warn!(topic = %topic, "Dropping publish, connection will not be retried");
                return Vec::new();
            }
            _ => {}
        }

        debug!(topic = %topic, state = %self.state, "Queueing publish until session is open");
        self.queue.push(topic, data);
        metrics::set_queue_depth(self.queue.len());
        Vec::new()
    }

    fn close(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.state == ConnectionState::BackoffWait {
            actions.push(Action::CancelRetry);
        }
        if self.state.has_transport() {
            actions.push(Action::CloseTransport);
        }

        let dropped = self.queue.clear();
        if dropped > 0 {
            warn!(dropped, "Dropping unsent publishes on close");
        }
        metrics::set_queue_depth(0);

        self.session.reset();
        self.state = ConnectionState::Closed {
            reason: CloseReason::Requested,
        };
        debug!("Closing connection");
        actions
    }

    /// A retryable failure: back off or give up.
    fn fail(&mut self, failure: ConnectionFailure) -> Vec<Action> {
        self.record_failure(failure);

        match self.backoff.next(&mut self.rng) {
            BackoffDecision::Retry { interval_ms, delay } => {
                info!(
                    delay_ms = delay.as_millis() as u64,
                    interval_ms, "Connection lost. Attempting to reconnect in {} ms",
                    delay.as_millis()
                );
                self.state = ConnectionState::BackoffWait;
                vec![Action::ScheduleRetry(delay)]
            }
            BackoffDecision::GiveUp => {
                error!(interval_ms = self.backoff.current_ms(), "Couldn't reconnect. Giving up");
                metrics::record_give_up();
                let dropped = self.queue.clear();
                if dropped > 0 {
                    warn!(dropped, "Dropping unsent publishes after giving up");
                }
                metrics::set_queue_depth(0);
                self.record_failure(ConnectionFailure::BackoffExhausted);
                self.state = ConnectionState::Closed {
                    reason: CloseReason::BackoffExhausted,
                };
                Vec::new()
            }
        }
    }

    fn record_failure(&mut self, failure: ConnectionFailure) {
        metrics::record_error(failure.kind());
        self.last_failure = Some(failure);
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state)
            .field("session", &self.session.token())
            .field("queued", &self.queue.len())
            .field("backoff_ms", &self.backoff.current_ms())
            .finish()
    }
}

/// Envelope-encode a publish; failures are logged and the publish dropped.
fn encode(topic: &str, data: Value) -> Option<String> {
    match codec::encode(&Envelope::new(topic, data)) {
        Ok(raw) => {
            debug!(topic = %topic, "[Send message]");
            metrics::record_message("outbound");
            Some(raw)
        }
        Err(e) => {
            error!(topic = %topic, error = %e, "Failed to encode publish");
            None
        }
    }
}
