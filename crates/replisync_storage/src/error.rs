//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A concurrent transaction committed a conflicting change.
    ///
    /// Equivalent to SQLSTATE `40001`.
    #[error("could not serialize access due to concurrent update")]
    SerializationFailure,

    /// The store detected a deadlock between transactions.
    ///
    /// Equivalent to SQLSTATE `40P01`.
    #[error("deadlock detected")]
    Deadlock,

    /// The store is not reachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The connection broke while a transaction was in flight.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A relation was accessed before the schema was bootstrapped.
    #[error("relation does not exist: {0}")]
    MissingRelation(&'static str),

    /// A write was attempted inside a read-only transaction.
    #[error("cannot execute write in a read-only transaction")]
    ReadOnlyTransaction,

    /// The transaction was already committed or rolled back.
    #[error("transaction is no longer active")]
    TransactionClosed,

    /// The schema version marker holds a value no migration knows about.
    #[error("unexpected schema version {found}, known migrations: {known}")]
    UnexpectedSchemaVersion {
        /// Version read from the store.
        found: u32,
        /// Number of registered migrations.
        known: u32,
    },

    /// A migration step failed.
    #[error("migration {version} failed: {message}")]
    Migration {
        /// Version of the failing migration.
        version: u32,
        /// Description of the failure.
        message: String,
    },
}

impl StorageError {
    /// Returns true if the whole transaction should be retried from the start.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::SerializationFailure | StorageError::Deadlock
        )
    }

    /// Returns true if the failure means the store itself is unreachable.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            StorageError::Unavailable(_) | StorageError::ConnectionLost(_)
        )
    }
}
