//! Store capability traits.

use crate::error::StorageResult;
use crate::rows::{ClientRow, EntryRow, SpaceRow};

/// Access mode requested when a transaction begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Reads only; writes are rejected.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

/// The authoritative relational store.
///
/// A store hands out serializable transactions over the space, client and
/// entry relations. It is the only state shared between server instances;
/// callers must not cache rows across transactions.
///
/// # Invariants
///
/// - Every transaction runs under serializable isolation
/// - Writes become visible atomically at `commit`, never partially
/// - Conflicts surface as [`crate::StorageError::SerializationFailure`] or
///   [`crate::StorageError::Deadlock`] from any operation, including `commit`
pub trait Store: Send + Sync {
    /// Begins a new transaction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::Unavailable`] if the store cannot be
    /// reached.
    fn begin(&self, mode: TxMode) -> StorageResult<Box<dyn StoreTransaction>>;

    /// Cheap reachability probe.
    fn ping(&self) -> StorageResult<()>;
}

/// A single serializable transaction.
pub trait StoreTransaction {
    /// Returns the access mode of this transaction.
    fn mode(&self) -> TxMode;

    /// Reads a partition row.
    fn get_space(&mut self, space_id: &str) -> StorageResult<Option<SpaceRow>>;

    /// Inserts or replaces a partition row.
    fn put_space(&mut self, row: SpaceRow) -> StorageResult<()>;

    /// Reads a client row.
    fn get_client(&mut self, client_id: &str) -> StorageResult<Option<ClientRow>>;

    /// Inserts or replaces a client row.
    fn put_client(&mut self, row: ClientRow) -> StorageResult<()>;

    /// Returns every client row owned by `client_group_id`, ordered by id.
    fn clients_in_group(&mut self, client_group_id: &str) -> StorageResult<Vec<ClientRow>>;

    /// Reads one entry, live or tombstoned.
    fn get_entry(&mut self, space_id: &str, key: &str) -> StorageResult<Option<EntryRow>>;

    /// Inserts or replaces an entry row.
    fn put_entry(&mut self, row: EntryRow) -> StorageResult<()>;

    /// Returns every entry of the partition with `version > since`,
    /// tombstones included, ordered by key.
    fn entries_since(&mut self, space_id: &str, since: u64) -> StorageResult<Vec<EntryRow>>;

    /// Returns the live entries of the partition whose key starts with
    /// `prefix`, ordered by key.
    fn live_entries(&mut self, space_id: &str, prefix: &str) -> StorageResult<Vec<EntryRow>>;

    /// Reads the schema version marker. Returns 0 for a blank store.
    fn schema_version(&mut self) -> StorageResult<u32>;

    /// Updates the schema version marker.
    fn set_schema_version(&mut self, version: u32) -> StorageResult<()>;

    /// Creates the space, client and entry relations if they are missing.
    fn create_sync_relations(&mut self) -> StorageResult<()>;

    /// Commits all buffered writes atomically.
    fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Discards all buffered writes.
    fn rollback(self: Box<Self>) -> StorageResult<()>;
}
