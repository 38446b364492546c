//! Error types for the sync server.

use replisync_core::CoreError;
use replisync_protocol::{ErrorKind, ErrorResponse, ProtocolError};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format or limits exceeded.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request body could not be decoded.
    #[error("malformed request: {0}")]
    Protocol(#[from] ProtocolError),

    /// A response message was sent where a request was expected.
    #[error("unexpected message type {0}")]
    UnexpectedMessage(u8),

    /// Sync core failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Client-visible failure category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::InvalidRequest(_)
            | ServerError::Protocol(_)
            | ServerError::UnexpectedMessage(_) => ErrorKind::InvalidRequest,
            ServerError::Core(e) => e.kind(),
            ServerError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidRequest | ErrorKind::MutationGap | ErrorKind::MutatorFailed => 400,
            ErrorKind::UnknownPartition => 404,
            ErrorKind::TransactionExhausted => 409,
            ErrorKind::StoreUnavailable => 503,
            ErrorKind::Internal => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Builds the error body sent to the client.
    ///
    /// Store-level failures get a fixed message so raw store errors never
    /// reach clients.
    pub fn to_response(&self) -> ErrorResponse {
        let kind = self.kind();
        let message = match kind {
            ErrorKind::TransactionExhausted => "too much contention, retry later".to_string(),
            ErrorKind::StoreUnavailable => "store unavailable".to_string(),
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.to_string(),
        };
        ErrorResponse::new(kind, message)
    }
}
