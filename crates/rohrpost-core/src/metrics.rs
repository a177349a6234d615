//! Metrics hooks for rohrpost.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding application installs a recorder.

use metrics::{counter, gauge};

/// Metric names.
pub mod names {
    pub const MESSAGES_TOTAL: &str = "rohrpost_messages_total";
    pub const RECONNECTS_TOTAL: &str = "rohrpost_reconnects_total";
    pub const GIVE_UPS_TOTAL: &str = "rohrpost_give_ups_total";
    pub const HANDSHAKES_TOTAL: &str = "rohrpost_handshakes_total";
    pub const ERRORS_TOTAL: &str = "rohrpost_errors_total";
    pub const QUEUE_DEPTH: &str = "rohrpost_queue_depth";
}

/// Describe all metrics to the installed recorder.
pub fn describe() {
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Messages sent and received");
    metrics::describe_counter!(names::RECONNECTS_TOTAL, "Reconnect attempts by reason");
    metrics::describe_counter!(
        names::GIVE_UPS_TOTAL,
        "Times the reconnect backoff reached its ceiling"
    );
    metrics::describe_counter!(names::HANDSHAKES_TOTAL, "Confirmed session handshakes");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Connection failures by kind");
    metrics::describe_gauge!(names::QUEUE_DEPTH, "Publishes waiting for an open session");
}

/// Record a message.
pub fn record_message(direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
}

/// Record a reconnect attempt.
pub fn record_reconnect(reason: &'static str) {
    counter!(names::RECONNECTS_TOTAL, "reason" => reason).increment(1);
}

/// Record a give-up.
pub fn record_give_up() {
    counter!(names::GIVE_UPS_TOTAL).increment(1);
}

/// Record a confirmed handshake.
pub fn record_handshake() {
    counter!(names::HANDSHAKES_TOTAL).increment(1);
}

/// Record a connection failure.
pub fn record_error(kind: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => kind).increment(1);
}

/// Update the outbound queue depth.
pub fn set_queue_depth(depth: usize) {
    gauge!(names::QUEUE_DEPTH).set(depth as f64);
}
