//! The public client handle and the task that drives it.
//!
//! [`Client::connect`] validates the configuration and spawns a driver task
//! that owns the [`ConnectionManager`], the negotiator, the transport and the
//! pending retry timer. All lifecycle work for one client happens on that
//! task; the handle only talks to it through a channel, a watch and a
//! cancellation token.

use rohrpost_transport::{Connection, Negotiator, Transport, TransportEvent};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::config::ClientConfig;
use crate::error::ConfigError;
use crate::manager::{Action, ConnectionManager, ConnectionState, Input};
use crate::router::TopicRouter;

/// Handle to a reconnecting pub/sub client.
///
/// Dropping the handle closes the client.
pub struct Client {
    commands: mpsc::UnboundedSender<Input>,
    router: Arc<TopicRouter>,
    state: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
    session_id: String,
}

impl Client {
    /// Validate `config` and start connecting in the background.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is rejected; nothing is
    /// spawned in that case.
    pub fn connect<N, T>(config: ClientConfig, negotiator: N, transport: T) -> Result<Self, ConfigError>
    where
        N: Negotiator + 'static,
        T: Transport + 'static,
    {
        let url = config.validate()?;
        let manager = ConnectionManager::new(&config);
        let session_id = manager.session_id().to_string();

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(manager.state());
        let router = Arc::new(TopicRouter::new());
        let shutdown = CancellationToken::new();

        let driver = Driver {
            manager,
            negotiator: Box::new(negotiator),
            transport: Box::new(transport),
            router: Arc::clone(&router),
            connection: None,
            retry: None,
            commands: commands_rx,
            state: state_tx,
            shutdown: shutdown.clone(),
        };

        debug!(session = %session_id, url = %url, "Starting client");
        let span = info_span!("rohrpost", session = %session_id);
        tokio::spawn(driver.run().instrument(span));

        Ok(Self {
            commands: commands_tx,
            router,
            state: state_rx,
            shutdown,
            session_id,
        })
    }

    /// Publish `data` on `topic`.
    ///
    /// Sent immediately while the session is open, queued until the next
    /// confirmation otherwise. Payloads that do not serialise are logged and
    /// dropped, as are publishes on a closed client.
    pub fn publish<D>(&self, topic: impl Into<String>, data: &D)
    where
        D: Serialize + ?Sized,
    {
        let topic = topic.into();
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(e) => {
                error!(topic = %topic, error = %e, "Failed to serialise publish");
                return;
            }
        };

        if self.commands.send(Input::Publish { topic, data }).is_err() {
            debug!("Client is closed, dropping publish");
        }
    }

    /// Subscribe to every envelope on `topic`.
    pub fn on<F>(&self, topic: impl Into<String>, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.router.on(topic, callback);
    }

    /// Subscribe to the next envelope on `topic` only.
    pub fn once<F>(&self, topic: impl Into<String>, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.router.once(topic, callback);
    }

    /// Run `callback` when the session is first confirmed.
    ///
    /// Fires at most once per client, not again after reconnects. Registering
    /// after the first confirmation runs `callback` immediately, so it is
    /// never missed because the driver got there first.
    pub fn on_open<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.router.on_open(callback);
    }

    /// Close the client. Idempotent.
    ///
    /// Cancels any pending reconnect, closes the transport and drops queued
    /// publishes. Use [`Client::closed`] to wait for it to finish.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Wait until the client reaches a terminal state.
    pub async fn closed(&self) -> ConnectionState {
        let mut state = self.state.clone();
        if let Ok(closed) = state.wait_for(ConnectionState::is_closed).await {
            return *closed;
        }
        // Driver gone without reaching Closed; report where it stopped.
        let last = *state.borrow();
        last
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether the session is currently confirmed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// The session token, stable for the life of the client.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// A receiver that observes every state change.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Owns one client's collaborators and executes its manager's actions.
struct Driver {
    manager: ConnectionManager,
    negotiator: Box<dyn Negotiator>,
    transport: Box<dyn Transport>,
    router: Arc<TopicRouter>,
    connection: Option<Box<dyn Connection>>,
    retry: Option<Pin<Box<Sleep>>>,
    commands: mpsc::UnboundedReceiver<Input>,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        let actions = self.manager.start();
        self.apply(actions).await;

        while !self.manager.state().is_closed() {
            let input = self.next_input().await;
            let actions = self.manager.handle(input);
            self.apply(actions).await;
        }

        if let Some(mut connection) = self.connection.take() {
            let _ = connection.close().await;
        }
        debug!(state = %self.manager.state(), "Driver stopped");
    }

    /// Execute actions, feeding follow-up inputs back through the manager.
    async fn apply(&mut self, actions: Vec<Action>) {
        let mut pending: VecDeque<Action> = actions.into();
        self.sync_state();

        while let Some(action) = pending.pop_front() {
            if let Some(input) = self.perform(action).await {
                pending.extend(self.manager.handle(input));
                self.sync_state();
            }
        }
    }

    async fn perform(&mut self, action: Action) -> Option<Input> {
        match action {
            Action::Negotiate(url) => {
                debug!(url = %url, "Negotiating endpoint");
                let result = tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return Some(Input::Close),
                    result = self.negotiator.resolve(&url) => result,
                };
                Some(Input::Negotiated(result))
            }
            Action::OpenTransport(endpoint) => {
                let opened = tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return Some(Input::Close),
                    opened = self.transport.open(&endpoint) => opened,
                };
                match opened {
                    Ok(connection) => {
                        debug!(
                            connection = %connection.id(),
                            transport = self.transport.name(),
                            endpoint = %endpoint,
                            "Transport opened"
                        );
                        self.connection = Some(connection);
                        Some(Input::TransportOpened)
                    }
                    Err(e) => Some(Input::TransportFailed(e.to_string())),
                }
            }
            Action::Send(raw) => {
                match self.connection.as_mut() {
                    Some(connection) => {
                        if let Err(e) = connection.send(raw).await {
                            warn!(connection = %connection.id(), error = %e, "Failed to send message");
                        }
                    }
                    None => warn!("No open transport, message dropped"),
                }
                None
            }
            Action::CloseTransport => {
                if let Some(mut connection) = self.connection.take() {
                    if let Err(e) = connection.close().await {
                        debug!(connection = %connection.id(), error = %e, "Transport close failed");
                    }
                }
                None
            }
            Action::ScheduleRetry(delay) => {
                self.retry = Some(Box::pin(tokio::time::sleep(delay)));
                None
            }
            Action::CancelRetry => {
                self.retry = None;
                None
            }
            Action::Route(raw) => {
                self.router.route(&raw);
                None
            }
            Action::EmitOpen => {
                self.router.emit_open();
                None
            }
        }
    }

    async fn next_input(&mut self) -> Input {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Input::Close,
            event = recv_event(&mut self.connection) => {
                if event.is_terminal() {
                    // Tear the transport down on its first terminal signal so
                    // it cannot report the same failure twice.
                    self.connection = None;
                }
                match event {
                    TransportEvent::Message(raw) => Input::Message(raw),
                    TransportEvent::Closed { code, was_clean } => {
                        Input::TransportClosed { code, was_clean }
                    }
                    TransportEvent::Error(reason) => Input::TransportError(reason),
                }
            }
            command = self.commands.recv() => command.unwrap_or(Input::Close),
            () = wait_retry(&mut self.retry) => {
                self.retry = None;
                Input::RetryElapsed
            }
        }
    }

    fn sync_state(&self) {
        let current = self.manager.state();
        self.state.send_if_modified(|state| {
            if *state == current {
                return false;
            }
            debug!(from = %state, to = %current, "State changed");
            *state = current;
            true
        });
    }
}

async fn recv_event(connection: &mut Option<Box<dyn Connection>>) -> TransportEvent {
    match connection {
        Some(connection) => connection.recv().await,
        None => future::pending().await,
    }
}

async fn wait_retry(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}
