//! Row types for the sync relations.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, used for `last_modified` columns.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A partition ("space") and its current version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceRow {
    /// Partition identifier.
    pub id: String,
    /// Current version (the sync cookie).
    pub version: u64,
    /// Last modification time (Unix millis).
    pub last_modified: u64,
}

impl SpaceRow {
    /// Creates a fresh partition at version 0.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: 0,
            last_modified: now_millis(),
        }
    }
}

/// Per-client mutation ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRow {
    /// Client identifier.
    pub id: String,
    /// Owning client group.
    pub client_group_id: String,
    /// Last applied mutation ID.
    pub last_mutation_id: u64,
    /// Partition version at which this row was last updated.
    pub version: u64,
    /// Last modification time (Unix millis).
    pub last_modified: u64,
}

impl ClientRow {
    /// Creates a record for a client that has not applied anything yet.
    pub fn new(id: impl Into<String>, client_group_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client_group_id: client_group_id.into(),
            last_mutation_id: 0,
            version: 0,
            last_modified: now_millis(),
        }
    }
}

/// State of an entry: a live value or a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    /// Live value, serialized as JSON text.
    Live(String),
    /// The key was deleted.
    Deleted,
}

impl EntryState {
    /// Returns the live value, if any.
    pub fn value(&self) -> Option<&str> {
        match self {
            EntryState::Live(value) => Some(value),
            EntryState::Deleted => None,
        }
    }

    /// Returns true for tombstones.
    pub fn is_deleted(&self) -> bool {
        matches!(self, EntryState::Deleted)
    }
}

/// A versioned key/value record inside a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRow {
    /// Owning partition.
    pub space_id: String,
    /// Key, unique within the partition.
    pub key: String,
    /// Live value or tombstone.
    pub state: EntryState,
    /// Partition version at which this entry last changed.
    pub version: u64,
    /// Last modification time (Unix millis).
    pub last_modified: u64,
}

impl EntryRow {
    /// Creates an entry row stamped with `version`.
    pub fn new(
        space_id: impl Into<String>,
        key: impl Into<String>,
        state: EntryState,
        version: u64,
    ) -> Self {
        Self {
            space_id: space_id.into(),
            key: key.into(),
            state,
            version,
            last_modified: now_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_state_accessors() {
        let live = EntryState::Live("1".into());
        assert_eq!(live.value(), Some("1"));
        assert!(!live.is_deleted());
        assert_eq!(EntryState::Deleted.value(), None);
        assert!(EntryState::Deleted.is_deleted());
    }

    #[test]
    fn new_rows_start_at_zero() {
        assert_eq!(SpaceRow::new("p1").version, 0);
        let client = ClientRow::new("c1", "g1");
        assert_eq!(client.last_mutation_id, 0);
        assert_eq!(client.client_group_id, "g1");
    }
}
