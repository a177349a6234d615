//! Topic routing for inbound envelopes.
//!
//! The router owns every subscription of one client and fans decoded
//! envelopes out to them. Dispatch is synchronous and in registration order.

use dashmap::DashMap;
use rohrpost_protocol::{codec, Envelope};
use serde_json::Value;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, trace};

use crate::error::ConnectionFailure;
use crate::metrics;

/// A subscriber callback.
pub type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

/// What a subscription listens to.
///
/// Lifecycle signals are keyed apart from topics so that no server topic can
/// trigger them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Signal {
    /// The one-shot "session open" signal.
    Open,
    /// Inbound envelopes for a topic.
    Topic(String),
}

impl Signal {
    /// Signal for a topic.
    #[must_use]
    pub fn topic(name: impl Into<String>) -> Self {
        Self::Topic(name.into())
    }
}

struct Subscription {
    callback: Callback,
    once: bool,
}

/// The one-shot open signal: waiting subscribers, or already fired.
enum OpenLatch {
    Pending(Vec<Callback>),
    Fired,
}

impl Default for OpenLatch {
    fn default() -> Self {
        Self::Pending(Vec::new())
    }
}

/// Per-client subscription registry and envelope dispatcher.
#[derive(Default)]
pub struct TopicRouter {
    subscriptions: DashMap<Signal, Vec<Subscription>>,
    open: Mutex<OpenLatch>,
}

impl TopicRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for every envelope on `topic`.
    pub fn on<F>(&self, topic: impl Into<String>, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.register(Signal::topic(topic), Arc::new(callback), false);
    }

    /// Register a callback for the next envelope on `topic` only.
    pub fn once<F>(&self, topic: impl Into<String>, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.register(Signal::topic(topic), Arc::new(callback), true);
    }

    /// Register a callback for the session-open signal.
    ///
    /// If the signal already fired, `callback` runs right away on the calling
    /// thread.
    pub fn on_open<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.register(Signal::Open, Arc::new(move |_: &Value| callback()), true);
    }

    /// Register a callback under an arbitrary signal.
    ///
    /// Open subscriptions are always one-shot; `once` only applies to topics.
    pub fn register(&self, signal: Signal, callback: Callback, once: bool) {
        trace!(signal = ?signal, once, "Subscription registered");
        match signal {
            Signal::Open => self.register_open(callback),
            topic => self
                .subscriptions
                .entry(topic)
                .or_default()
                .push(Subscription { callback, once }),
        }
    }

    fn register_open(&self, callback: Callback) {
        let mut latch = self.open_latch();
        if let OpenLatch::Pending(callbacks) = &mut *latch {
            callbacks.push(callback);
            return;
        }
        drop(latch);

        debug!("Session already open, running callback now");
        callback(&Value::Null);
    }

    fn open_latch(&self) -> MutexGuard<'_, OpenLatch> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Invoke every subscriber of `signal` with `data`.
    ///
    /// One-shot subscriptions are removed before any callback runs, so a
    /// callback may register new subscriptions without deadlocking. A panic
    /// in a callback propagates to the caller.
    ///
    /// Returns the number of callbacks invoked.
    pub fn emit(&self, signal: &Signal, data: &Value) -> usize {
        if *signal == Signal::Open {
            return self.emit_open();
        }

        let callbacks: Vec<Callback> = match self.subscriptions.get_mut(signal) {
            Some(mut entry) => {
                let callbacks = entry.iter().map(|s| Arc::clone(&s.callback)).collect();
                entry.retain(|s| !s.once);
                callbacks
            }
            None => return 0,
        };

        for callback in &callbacks {
            callback(data);
        }
        callbacks.len()
    }

    /// Fire the session-open signal.
    ///
    /// Only the first call invokes anything. Subscribers registered after it
    /// run immediately instead.
    pub fn emit_open(&self) -> usize {
        let callbacks = match mem::replace(&mut *self.open_latch(), OpenLatch::Fired) {
            OpenLatch::Pending(callbacks) => callbacks,
            OpenLatch::Fired => return 0,
        };

        for callback in &callbacks {
            callback(&Value::Null);
        }
        callbacks.len()
    }

    /// Whether the session-open signal has fired.
    #[must_use]
    pub fn is_open_fired(&self) -> bool {
        matches!(*self.open_latch(), OpenLatch::Fired)
    }

    /// Decode a raw inbound message and dispatch it to its topic.
    ///
    /// Malformed envelopes are logged and dropped. Returns the number of
    /// callbacks invoked, or `None` if the message did not decode.
    pub fn route(&self, raw: &str) -> Option<usize> {
        match codec::decode(raw) {
            Ok(envelope) => Some(self.dispatch(envelope)),
            Err(e) => {
                let failure = ConnectionFailure::MalformedEnvelope(e.to_string());
                error!(raw = %raw, "{}", failure);
                metrics::record_error(failure.kind());
                None
            }
        }
    }

    /// Dispatch a decoded envelope.
    pub fn dispatch(&self, envelope: Envelope) -> usize {
        let (topic, data) = envelope.into_parts();
        debug!(topic = %topic, "[Received message]");
        metrics::record_message("inbound");
        self.emit(&Signal::Topic(topic), &data)
    }

    /// Number of live subscriptions for a signal.
    #[must_use]
    pub fn subscriber_count(&self, signal: &Signal) -> usize {
        match signal {
            Signal::Open => match &*self.open_latch() {
                OpenLatch::Pending(callbacks) => callbacks.len(),
                OpenLatch::Fired => 0,
            },
            topic => self.subscriptions.get(topic).map_or(0, |e| e.len()),
        }
    }
}

impl std::fmt::Debug for TopicRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicRouter")
            .field("topics", &self.subscriptions.len())
            .field("open_fired", &self.is_open_fired())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Callback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = Arc::clone(&log);
            move |name: &str| -> Callback {
                let log = Arc::clone(&log);
                let name = name.to_string();
                Arc::new(move |data: &Value| log.lock().unwrap().push(format!("{name}:{data}")))
            }
        };
        (log, make)
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let router = TopicRouter::new();
        let (log, make) = recorder();

        router.register(Signal::topic("a.pong"), make("first"), false);
        router.register(Signal::topic("a.pong"), make("second"), false);
        router.register(Signal::topic("other"), make("other"), false);

        let count = router.route(r#"{"topic":"a.pong","data":{"foo":"bar"}}"#);
        assert_eq!(count, Some(2));
        assert_eq!(
            *log.lock().unwrap(),
            vec![r#"first:{"foo":"bar"}"#, r#"second:{"foo":"bar"}"#]
        );
    }

    #[test]
    fn test_once_fires_once() {
        let router = TopicRouter::new();
        let (log, make) = recorder();

        router.register(Signal::topic("t"), make("once"), true);
        router.register(Signal::topic("t"), make("always"), false);

        router.dispatch(Envelope::new("t", json!(1)));
        router.dispatch(Envelope::new("t", json!(2)));

        assert_eq!(*log.lock().unwrap(), vec!["once:1", "always:1", "always:2"]);
        assert_eq!(router.subscriber_count(&Signal::topic("t")), 1);
    }

    #[test]
    fn test_topic_cannot_trigger_open() {
        let router = TopicRouter::new();
        let (log, make) = recorder();
        router.register(Signal::Open, make("open"), true);

        router.dispatch(Envelope::new("open", Value::Null));
        assert!(log.lock().unwrap().is_empty());

        assert_eq!(router.emit_open(), 1);
        assert_eq!(router.emit_open(), 0);
        assert_eq!(*log.lock().unwrap(), vec!["open:null"]);
    }

    #[test]
    fn test_open_subscriber_after_emit_runs_immediately() {
        let router = TopicRouter::new();
        let (log, make) = recorder();

        router.register(Signal::Open, make("early"), true);
        assert_eq!(router.subscriber_count(&Signal::Open), 1);
        assert_eq!(router.emit_open(), 1);
        assert!(router.is_open_fired());

        router.register(Signal::Open, make("late"), true);
        assert_eq!(*log.lock().unwrap(), vec!["early:null", "late:null"]);

        // Nothing is kept around to fire a second time.
        assert_eq!(router.subscriber_count(&Signal::Open), 0);
        assert_eq!(router.emit(&Signal::Open, &Value::Null), 0);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_open_latch_across_threads() {
        let router = Arc::new(TopicRouter::new());
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let emitter = {
            let router = Arc::clone(&router);
            std::thread::spawn(move || router.emit_open())
        };
        for _ in 0..8 {
            let count = Arc::clone(&count);
            router.on_open(move || {
                count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            });
        }
        emitter.join().unwrap();

        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 8);
    }

    #[test]
    fn test_callback_may_subscribe_during_dispatch() {
        let router = Arc::new(TopicRouter::new());
        let (log, make) = recorder();

        let inner = Arc::clone(&router);
        let late = make("late");
        router.once("t", move |_| inner.register(Signal::topic("t"), Arc::clone(&late), false));

        router.dispatch(Envelope::new("t", json!(1)));
        router.dispatch(Envelope::new("t", json!(2)));

        assert_eq!(*log.lock().unwrap(), vec!["late:2"]);
    }

    #[test]
    #[traced_test]
    fn test_malformed_envelope_is_logged_and_dropped() {
        let router = TopicRouter::new();
        let (log, make) = recorder();
        router.register(Signal::topic("t"), make("t"), false);

        assert_eq!(router.route("{not json"), None);
        assert!(log.lock().unwrap().is_empty());
        assert!(logs_contain("Malformed envelope"));
    }

    #[test]
    fn test_unsubscribed_topic_is_ignored() {
        let router = TopicRouter::new();
        assert_eq!(router.route(r#"{"topic":"nobody","data":null}"#), Some(0));
    }
}
