//! Session identity and handshake confirmation.

use rand::distributions::Alphanumeric;
use rand::Rng;
use rohrpost_protocol::confirmation_for;

/// Length of generated session tokens.
const TOKEN_LENGTH: usize = 16;

/// Generate a random session token.
#[must_use]
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// The session token and whether the current connection confirmed it.
///
/// The token is fixed for the lifetime of the client; confirmation is per
/// connection attempt.
#[derive(Debug, Clone)]
pub struct SessionHandshake {
    token: String,
    expected: String,
    confirmed: bool,
}

impl SessionHandshake {
    /// Create a handshake with a fresh random token.
    #[must_use]
    pub fn new() -> Self {
        Self::with_token(generate_token())
    }

    /// Create a handshake with a known token.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            expected: confirmation_for(&token),
            token,
            confirmed: false,
        }
    }

    /// The session token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The raw message to send first on a freshly opened transport.
    #[must_use]
    pub fn bootstrap_message(&self) -> String {
        self.token.clone()
    }

    /// The reply that confirms this session.
    #[must_use]
    pub fn expected_reply(&self) -> &str {
        &self.expected
    }

    /// Check a server reply; marks the session confirmed on an exact match.
    pub fn confirm(&mut self, raw: &str) -> bool {
        let matched = raw == self.expected;
        if matched {
            self.confirmed = true;
        }
        matched
    }

    /// Whether the current connection is confirmed.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Forget the confirmation after a disconnect.
    pub fn reset(&mut self) {
        self.confirmed = false;
    }
}

impl Default for SessionHandshake {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_differ() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LENGTH);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_confirm_exact_match_only() {
        let mut session = SessionHandshake::with_token("T");
        assert_eq!(session.bootstrap_message(), "T");

        assert!(!session.confirm("ok:t"));
        assert!(!session.confirm("ok:T "));
        assert!(!session.confirm("T"));
        assert!(!session.is_confirmed());

        assert!(session.confirm("ok:T"));
        assert!(session.is_confirmed());
    }

    #[test]
    fn test_reset_keeps_token() {
        let mut session = SessionHandshake::with_token("abc");
        session.confirm("ok:abc");
        session.reset();

        assert!(!session.is_confirmed());
        assert_eq!(session.token(), "abc");
    }
}
