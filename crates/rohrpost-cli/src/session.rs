//! The interactive session: subscribe-and-print plus publish-from-stdin.

use crate::config::Config;
use anyhow::{bail, Context, Result};
use rohrpost_core::{Client, CloseReason, ConnectionState};
use rohrpost_transport::{HttpNegotiator, WebSocketTransport};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Why the session loop stopped.
enum Exit {
    /// Stdin reached EOF.
    Eof,
    /// Ctrl-C.
    Interrupted,
    /// The client stopped on its own.
    Ended(ConnectionState),
}

/// Connect, print subscribed topics and publish stdin lines until done.
///
/// # Errors
///
/// Returns an error if the client cannot be set up or the connection ends
/// without being asked to.
pub async fn run(config: Config) -> Result<()> {
    let negotiator = HttpNegotiator::with_timeout(config.negotiate_timeout())
        .context("Failed to build HTTP negotiator")?;
    let transport = WebSocketTransport::new(config.websocket_config());
    let client = Client::connect(config.client_config(), negotiator, transport)
        .context("Invalid client configuration")?;

    info!(session = %client.session_id(), url = %config.url, "Connecting");

    client.on_open(|| info!("Session open"));
    for topic in &config.subscribe {
        let name = topic.clone();
        client.on(topic.as_str(), move |data| println!("{name} {data}"));
        debug!(topic = %topic, "Subscribed");
    }

    let mut states = client.state_changes();
    let exit = pump_stdin(&client, &mut states).await?;

    if matches!(exit, Exit::Eof) && !client.is_open() {
        // Give queued publishes a chance to go out.
        tokio::select! {
            _ = states.wait_for(is_settled) => {}
            _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        }
    }

    client.close();
    let state = client.closed().await;
    info!(state = %state, "Client closed");

    match exit {
        Exit::Ended(ConnectionState::Disconnected) => bail!("Connection ended without a retry"),
        Exit::Ended(ConnectionState::Closed {
            reason: CloseReason::BackoffExhausted,
        }) => bail!("Couldn't reconnect, giving up"),
        _ => Ok(()),
    }
}

async fn pump_stdin(client: &Client, states: &mut watch::Receiver<ConnectionState>) -> Result<Exit> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    debug!("stdin closed");
                    return Ok(Exit::Eof);
                };
                match parse_publish_line(&line) {
                    Ok(Some((topic, data))) => client.publish(topic, &data),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Skipping line"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(Exit::Interrupted);
            }
            changed = states.changed() => {
                let state = *states.borrow_and_update();
                if changed.is_err() || is_ended(&state) {
                    warn!(state = %state, "Connection ended");
                    return Ok(Exit::Ended(state));
                }
            }
        }
    }
}

/// The client will not make progress without intervention.
fn is_ended(state: &ConnectionState) -> bool {
    state.is_closed() || *state == ConnectionState::Disconnected
}

fn is_settled(state: &ConnectionState) -> bool {
    *state == ConnectionState::Open || is_ended(state)
}

/// Parse a `<topic> [json]` line. Blank lines yield `None`.
///
/// # Errors
///
/// Returns an error if the payload is not valid JSON.
pub fn parse_publish_line(line: &str) -> Result<Option<(String, Value)>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (topic, payload) = match line.split_once(char::is_whitespace) {
        Some((topic, payload)) => (topic, payload.trim()),
        None => (line, ""),
    };

    let data = if payload.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(payload)
            .with_context(|| format!("Invalid JSON payload for topic {topic}"))?
    };

    Ok(Some((topic.to_string(), data)))
}
