//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// CBOR encoding failed.
    #[error("cbor encode error: {0}")]
    CborEncode(String),

    /// CBOR decoding failed.
    #[error("cbor decode error: {0}")]
    CborDecode(String),

    /// A frame carried a type code no message uses.
    #[error("unknown message type code: {0}")]
    UnknownMessageType(u8),

    /// A frame had no type code.
    #[error("empty message frame")]
    EmptyFrame,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            ProtocolError::UnknownMessageType(42).to_string(),
            "unknown message type code: 42"
        );
        assert_eq!(ProtocolError::EmptyFrame.to_string(), "empty message frame");
    }
}
