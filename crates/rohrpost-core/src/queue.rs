//! Outbound buffering while the session is not confirmed.

use serde_json::Value;
use std::collections::VecDeque;

/// A publish waiting for the session to open.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    /// Target topic.
    pub topic: String,
    /// Payload.
    pub data: Value,
}

/// FIFO buffer of publishes made while unconfirmed.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    entries: VecDeque<QueueEntry>,
}

impl OutboundQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a publish.
    pub fn push(&mut self, topic: impl Into<String>, data: Value) {
        self.entries.push_back(QueueEntry {
            topic: topic.into(),
            data,
        });
    }

    /// Take every entry, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = QueueEntry> + '_ {
        self.entries.drain(..)
    }

    /// Drop every entry, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    /// Number of buffered publishes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_drain_is_fifo() {
        let mut queue = OutboundQueue::new();
        queue.push("a", json!(1));
        queue.push("b", json!(2));
        queue.push("c", json!(3));

        let topics: Vec<String> = queue.drain().map(|e| e.topic).collect();
        assert_eq!(topics, vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_twice_yields_nothing() {
        let mut queue = OutboundQueue::new();
        queue.push("a", json!(null));

        assert_eq!(queue.drain().count(), 1);
        assert_eq!(queue.drain().count(), 0);
    }

    #[test]
    fn test_clear() {
        let mut queue = OutboundQueue::new();
        queue.push("a", json!(1));
        queue.push("a", json!(2));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}
