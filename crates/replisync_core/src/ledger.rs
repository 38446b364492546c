//! Mutation ledger: last applied mutation ID per client.

use crate::error::{CoreError, CoreResult};
use replisync_storage::{now_millis, ClientRow, StoreTransaction};
use std::collections::BTreeMap;

/// Loads a client's ledger row, or a fresh one for an unseen client.
///
/// # Errors
///
/// Returns [`CoreError::ClientGroupMismatch`] if the client is already
/// recorded under a different client group.
pub fn load_client(
    tx: &mut dyn StoreTransaction,
    client_id: &str,
    client_group_id: &str,
) -> CoreResult<ClientRow> {
    match tx.get_client(client_id)? {
        Some(row) if row.client_group_id != client_group_id => Err(CoreError::ClientGroupMismatch {
            client_id: client_id.to_string(),
            expected: row.client_group_id,
            actual: client_group_id.to_string(),
        }),
        Some(row) => Ok(row),
        None => Ok(ClientRow::new(client_id, client_group_id)),
    }
}

/// Persists a ledger row stamped with the partition `version`.
pub fn record_client(
    tx: &mut dyn StoreTransaction,
    mut row: ClientRow,
    version: u64,
) -> CoreResult<()> {
    row.version = version;
    row.last_modified = now_millis();
    tx.put_client(row)?;
    Ok(())
}

/// Returns the last applied mutation ID of every known client in the group.
pub fn last_mutation_ids(
    tx: &mut dyn StoreTransaction,
    client_group_id: &str,
) -> CoreResult<BTreeMap<String, u64>> {
    Ok(tx
        .clients_in_group(client_group_id)?
        .into_iter()
        .map(|row| (row.id, row.last_mutation_id))
        .collect())
}
