//! Session handshake and close-code conventions.
//!
//! The first message on a fresh transport is the bare session token. The
//! server proves it accepted the token by answering `ok:<token>`.

/// Prefix of the server's handshake confirmation.
pub const CONFIRMATION_PREFIX: &str = "ok:";

/// Close code the server uses to ask a client to reconnect right away.
pub const RECONNECT_CLOSE_CODE: u16 = 100;

/// The confirmation string a server sends for `token`.
#[must_use]
pub fn confirmation_for(token: &str) -> String {
    format!("{CONFIRMATION_PREFIX}{token}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_for() {
        assert_eq!(confirmation_for("abc123"), "ok:abc123");
    }
}
