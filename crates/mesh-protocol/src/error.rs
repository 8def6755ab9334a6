//! Protocol-level error types.

use thiserror::Error;

/// Errors arising from wire data, as opposed to session behavior.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An out-of-band token blob could not be decoded.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// A value could not be serialized for the wire.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A channel payload was not a recognized message.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", ProtocolError::InvalidToken("bad base64".to_string())),
            "Invalid token: bad base64"
        );
        assert_eq!(
            format!(
                "{}",
                ProtocolError::MalformedMessage("missing type".to_string())
            ),
            "Malformed message: missing type"
        );
    }
}
