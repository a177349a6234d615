//! Codec for encoding and decoding rohrpost envelopes.
//!
//! Envelopes are JSON text. Each transport message carries exactly one envelope,
//! so there is no length prefix.

use thiserror::Error;

use crate::envelope::Envelope;

/// Maximum inbound envelope size (16 MiB).
pub const MAX_ENVELOPE_SIZE: usize = 16 * 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Envelope exceeds maximum size.
    #[error("Envelope size {0} exceeds maximum {MAX_ENVELOPE_SIZE}")]
    EnvelopeTooLarge(usize),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON decoding error, including envelopes missing a `topic`.
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encode an envelope to its wire text.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn encode(envelope: &Envelope) -> Result<String, ProtocolError> {
    serde_json::to_string(envelope).map_err(ProtocolError::Encode)
}

/// Decode an envelope from wire text.
///
/// # Errors
///
/// Returns an error if the text is too large, is not JSON, or is not an
/// object with a string `topic`.
pub fn decode(raw: &str) -> Result<Envelope, ProtocolError> {
    if raw.len() > MAX_ENVELOPE_SIZE {
        return Err(ProtocolError::EnvelopeTooLarge(raw.len()));
    }

    serde_json::from_str(raw).map_err(ProtocolError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_encode_matches_wire_shape() {
        let envelope = Envelope::new("a.ping", json!({"foo": "bar"}));
        let encoded = encode(&envelope).unwrap();

        let parsed: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(parsed, json!({"topic": "a.ping", "data": {"foo": "bar"}}));
    }

    #[test]
    fn test_decode_server_envelope() {
        let decoded = decode(r#"{"topic":"a.pong","data":{"foo":"bar"}}"#).unwrap();
        assert_eq!(decoded.topic, "a.pong");
        assert_eq!(decoded.data, json!({"foo": "bar"}));
    }

    #[test]
    fn test_decode_missing_data_is_null() {
        let decoded = decode(r#"{"topic":"a.empty"}"#).unwrap();
        assert_eq!(decoded.data, Value::Null);
    }

    #[test]
    fn test_decode_tolerates_extra_fields() {
        let decoded = decode(r#"{"topic":"t","data":1,"sender":"x"}"#).unwrap();
        assert_eq!(decoded.topic, "t");
    }

    #[test]
    fn test_decode_malformed() {
        for raw in ["not json", "{\"data\":1}", "[1,2]", "{\"topic\":7}", ""] {
            match decode(raw) {
                Err(ProtocolError::Decode(_)) => {}
                other => panic!("Expected Decode error for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_envelope_too_large() {
        let raw = " ".repeat(MAX_ENVELOPE_SIZE + 1);

        match decode(&raw) {
            Err(ProtocolError::EnvelopeTooLarge(_)) => {}
            other => panic!("Expected EnvelopeTooLarge error, got {:?}", other),
        }
    }
}
