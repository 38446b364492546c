//! Error types for the sync core.

use replisync_protocol::ErrorKind;
use replisync_storage::StorageError;
use thiserror::Error;

/// Result type for sync core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while pushing or pulling.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Every attempt of a transaction hit a conflict.
    #[error("transaction gave up after {attempts} attempts: {last}")]
    TransactionExhausted {
        /// Attempts made.
        attempts: u32,
        /// Description of the last conflict.
        last: String,
    },

    /// A mutation ID skipped ahead of the client's ledger.
    #[error("mutation gap for client {client_id}: expected {expected}, got {actual}")]
    MutationGap {
        /// Offending client.
        client_id: String,
        /// Next ID the ledger accepts.
        expected: u64,
        /// ID that was submitted.
        actual: u64,
    },

    /// Pull against a partition that was never written.
    #[error("unknown space: {0}")]
    UnknownPartition(String),

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// An application mutator failed; its batch was rolled back.
    #[error("mutator {name} failed: {message}")]
    MutatorFailed {
        /// Mutator name.
        name: String,
        /// Failure detail.
        message: String,
    },

    /// No mutator is registered under this name.
    #[error("unknown mutator: {0}")]
    UnknownMutator(String),

    /// Raised by mutator code to reject a mutation.
    #[error("mutation rejected: {0}")]
    Rejected(String),

    /// A mutator name was empty or registered twice.
    #[error("invalid mutator name: {0:?}")]
    InvalidMutatorName(String),

    /// A client already belongs to another client group.
    #[error("client {client_id} belongs to client group {expected}, not {actual}")]
    ClientGroupMismatch {
        /// Client ID.
        client_id: String,
        /// Group recorded in the ledger.
        expected: String,
        /// Group named by the request.
        actual: String,
    },

    /// A stored value could not be decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CoreError {
    /// Creates a rejection for use inside mutators.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Returns true if the failure is a store conflict worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Storage(e) if e.is_retryable())
    }

    /// Returns true if the failure means the store is unreachable.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            CoreError::StoreUnavailable(_) => true,
            CoreError::Storage(e) => e.is_connection_failure(),
            _ => false,
        }
    }

    /// Maps the error onto the client-visible failure category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::TransactionExhausted { .. } => ErrorKind::TransactionExhausted,
            CoreError::MutationGap { .. } => ErrorKind::MutationGap,
            CoreError::UnknownPartition(_) => ErrorKind::UnknownPartition,
            CoreError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            CoreError::MutatorFailed { .. }
            | CoreError::UnknownMutator(_)
            | CoreError::Rejected(_) => ErrorKind::MutatorFailed,
            CoreError::InvalidMutatorName(_) | CoreError::ClientGroupMismatch { .. } => {
                ErrorKind::InvalidRequest
            }
            CoreError::Storage(e) if e.is_connection_failure() => ErrorKind::StoreUnavailable,
            CoreError::Storage(_) | CoreError::Codec(_) => ErrorKind::Internal,
        }
    }
}
