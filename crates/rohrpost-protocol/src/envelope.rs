//! The topic envelope.
//!
//! Envelopes are the unit of traffic once a session is confirmed. Many logical
//! topics share one physical connection; the envelope says which topic a
//! payload belongs to.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A topic/payload pair as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Topic the payload is published to.
    pub topic: String,
    /// Arbitrary payload, `null` included.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Create a new envelope.
    #[must_use]
    pub fn new(topic: impl Into<String>, data: Value) -> Self {
        Self {
            topic: topic.into(),
            data,
        }
    }

    /// Split the envelope into its topic and payload.
    #[must_use]
    pub fn into_parts(self) -> (String, Value) {
        (self.topic, self.data)
    }
}
