//! Partition version store.
//!
//! Each partition carries a single monotonic version, which doubles as the
//! cookie handed to clients on pull.

use crate::error::CoreResult;
use replisync_storage::{now_millis, SpaceRow, StoreTransaction};

/// Reads a partition row, or `None` if the partition was never written.
pub fn load_space(
    tx: &mut dyn StoreTransaction,
    space_id: &str,
) -> CoreResult<Option<SpaceRow>> {
    Ok(tx.get_space(space_id)?)
}

/// Reads a partition's current version.
pub fn current_version(
    tx: &mut dyn StoreTransaction,
    space_id: &str,
) -> CoreResult<Option<u64>> {
    Ok(load_space(tx, space_id)?.map(|row| row.version))
}

/// Writes `version` for the partition, creating the row if needed.
pub fn store_version(
    tx: &mut dyn StoreTransaction,
    space_id: &str,
    version: u64,
) -> CoreResult<()> {
    let mut row = SpaceRow::new(space_id);
    row.version = version;
    row.last_modified = now_millis();
    tx.put_space(row)?;
    Ok(())
}
