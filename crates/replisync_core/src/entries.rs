//! Entry store: versioned key/value rows with tombstones.

use crate::error::{CoreError, CoreResult};
use replisync_protocol::PatchOperation;
use replisync_storage::{EntryRow, EntryState, StoreTransaction};
use serde_json::Value;

/// Reads the live value of a key. Tombstones read as absent.
pub fn get_value(
    tx: &mut dyn StoreTransaction,
    space_id: &str,
    key: &str,
) -> CoreResult<Option<Value>> {
    match tx.get_entry(space_id, key)? {
        Some(row) => decode_state(&row.state),
        None => Ok(None),
    }
}

/// Writes a live value stamped with `version`.
pub fn put_value(
    tx: &mut dyn StoreTransaction,
    space_id: &str,
    key: &str,
    value: &Value,
    version: u64,
) -> CoreResult<()> {
    let text = serde_json::to_string(value).map_err(|e| CoreError::Codec(e.to_string()))?;
    tx.put_entry(EntryRow::new(space_id, key, EntryState::Live(text), version))?;
    Ok(())
}

/// Replaces a key with a tombstone stamped with `version`.
pub fn delete_value(
    tx: &mut dyn StoreTransaction,
    space_id: &str,
    key: &str,
    version: u64,
) -> CoreResult<()> {
    tx.put_entry(EntryRow::new(space_id, key, EntryState::Deleted, version))?;
    Ok(())
}

/// Returns the live entries whose key starts with `prefix`, ordered by key.
pub fn scan_values(
    tx: &mut dyn StoreTransaction,
    space_id: &str,
    prefix: &str,
) -> CoreResult<Vec<(String, Value)>> {
    let mut out = Vec::new();
    for row in tx.live_entries(space_id, prefix)? {
        if let Some(value) = decode_state(&row.state)? {
            out.push((row.key, value));
        }
    }
    Ok(out)
}

/// Builds the patch of every entry changed after version `since`.
///
/// Live entries become puts, tombstones become deletes.
pub fn changes_since(
    tx: &mut dyn StoreTransaction,
    space_id: &str,
    since: u64,
) -> CoreResult<Vec<PatchOperation>> {
    tx.entries_since(space_id, since)?
        .into_iter()
        .map(|row| -> CoreResult<PatchOperation> {
            match row.state {
                EntryState::Live(text) => Ok(PatchOperation::put(row.key, decode(&text)?)),
                EntryState::Deleted => Ok(PatchOperation::del(row.key)),
            }
        })
        .collect()
}

fn decode_state(state: &EntryState) -> CoreResult<Option<Value>> {
    state.value().map(decode).transpose()
}

fn decode(text: &str) -> CoreResult<Value> {
    serde_json::from_str(text).map_err(|e| CoreError::Codec(e.to_string()))
}
