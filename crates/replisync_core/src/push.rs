//! Push processor.
//!
//! Applies an ordered batch of client mutations inside one transaction:
//!
//! 1. Mutations at or below a client's last applied ID are skipped
//! 2. A mutation that skips ahead is a gap, handled per [`GapPolicy`]
//! 3. The rest run through their mutator against a buffered entry view
//! 4. If the batch changed any entry, the partition version goes up by one
//!    and every changed entry is stamped with it
//!
//! The caller owns the transaction and its retry loop; any error returned
//! here must abort the whole batch.

use crate::config::{GapPolicy, PushOptions};
use crate::entries;
use crate::error::{CoreError, CoreResult};
use crate::ledger;
use crate::mutator::{MutatorRegistry, Overlay, WriteTransaction};
use crate::space;
use replisync_protocol::PushRequest;
use replisync_storage::{ClientRow, StoreTransaction};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Result of a committed push batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    /// Partition the batch was applied to.
    pub space_id: String,
    /// Partition version after the batch.
    pub version: u64,
    /// Mutations that ran.
    pub applied: usize,
    /// Mutations skipped as duplicates or behind a gap.
    pub skipped: usize,
    /// Keys whose state changed, ordered.
    pub changed_keys: Vec<String>,
}

impl PushOutcome {
    /// Returns true if the batch changed any entry.
    pub fn changed(&self) -> bool {
        !self.changed_keys.is_empty()
    }
}

/// Applies `request` within `tx`.
///
/// # Errors
///
/// - [`CoreError::MutationGap`] under [`GapPolicy::RejectBatch`]
/// - [`CoreError::UnknownMutator`] for an unregistered mutation name
/// - [`CoreError::MutatorFailed`] when a mutator returns an error
/// - [`CoreError::ClientGroupMismatch`] for a client owned by another group
/// - Storage errors, including conflicts the caller should retry
pub fn process_push(
    tx: &mut dyn StoreTransaction,
    registry: &MutatorRegistry,
    options: &PushOptions,
    request: &PushRequest,
) -> CoreResult<PushOutcome> {
    let space_id = request.space_id.as_str();
    let existing = space::load_space(tx, space_id)?;
    let current_version = existing.as_ref().map_or(0, |row| row.version);

    let mut clients: BTreeMap<String, ClientRow> = BTreeMap::new();
    let mut blocked: HashSet<String> = HashSet::new();
    let mut touched: HashSet<String> = HashSet::new();
    let mut overlay = Overlay::new();
    let mut applied = 0;
    let mut skipped = 0;

    for mutation in &request.mutations {
        if blocked.contains(&mutation.client_id) {
            skipped += 1;
            continue;
        }

        if !clients.contains_key(&mutation.client_id) {
            let row = ledger::load_client(tx, &mutation.client_id, &request.client_group_id)?;
            clients.insert(mutation.client_id.clone(), row);
        }
        let last_applied = clients
            .get(&mutation.client_id)
            .map_or(0, |row| row.last_mutation_id);

        if mutation.id <= last_applied {
            debug!(
                client_id = %mutation.client_id,
                mutation_id = mutation.id,
                last_applied,
                "Skipping already applied mutation"
            );
            skipped += 1;
            continue;
        }

        let expected = last_applied + 1;
        if mutation.id > expected {
            match options.gap_policy {
                GapPolicy::RejectBatch => {
                    warn!(
                        client_id = %mutation.client_id,
                        expected,
                        actual = mutation.id,
                        "Rejecting batch with mutation gap"
                    );
                    return Err(CoreError::MutationGap {
                        client_id: mutation.client_id.clone(),
                        expected,
                        actual: mutation.id,
                    });
                }
                GapPolicy::SkipClient => {
                    warn!(
                        client_id = %mutation.client_id,
                        expected,
                        actual = mutation.id,
                        "Mutation gap, skipping rest of client's mutations"
                    );
                    blocked.insert(mutation.client_id.clone());
                    skipped += 1;
                    continue;
                }
            }
        }

        let mutator = registry.get(&mutation.name)?;
        let mut view = WriteTransaction::new(tx, space_id, &mut overlay);
        (**mutator)(&mut view, &mutation.args).map_err(|err| {
            if err.is_retryable() || err.is_connection_failure() {
                err
            } else {
                warn!(name = %mutation.name, error = %err, "Mutator failed");
                CoreError::MutatorFailed {
                    name: mutation.name.clone(),
                    message: err.to_string(),
                }
            }
        })?;

        if let Some(row) = clients.get_mut(&mutation.client_id) {
            row.last_mutation_id = mutation.id;
        }
        touched.insert(mutation.client_id.clone());
        applied += 1;
    }

    if applied == 0 {
        return Ok(PushOutcome {
            space_id: space_id.to_string(),
            version: current_version,
            applied,
            skipped,
            changed_keys: Vec::new(),
        });
    }

    let changes = net_changes(tx, space_id, overlay)?;
    let version = if changes.is_empty() {
        current_version
    } else {
        current_version + 1
    };

    let mut changed_keys = Vec::with_capacity(changes.len());
    for (key, value) in changes {
        match &value {
            Some(value) => entries::put_value(tx, space_id, &key, value, version)?,
            None => entries::delete_value(tx, space_id, &key, version)?,
        }
        changed_keys.push(key);
    }

    for (client_id, row) in clients {
        if touched.contains(&client_id) {
            ledger::record_client(tx, row, version)?;
        }
    }

    if existing.is_none() || version != current_version {
        space::store_version(tx, space_id, version)?;
    }

    debug!(
        space_id,
        version,
        applied,
        skipped,
        changed = changed_keys.len(),
        "Push batch processed"
    );

    Ok(PushOutcome {
        space_id: space_id.to_string(),
        version,
        applied,
        skipped,
        changed_keys,
    })
}

/// Drops buffered writes that leave the stored state unchanged.
fn net_changes(
    tx: &mut dyn StoreTransaction,
    space_id: &str,
    overlay: Overlay,
) -> CoreResult<Vec<(String, Option<Value>)>> {
    let mut changes = Vec::new();
    for (key, pending) in overlay {
        let stored = entries::get_value(tx, space_id, &key)?;
        if stored != pending {
            changes.push((key, pending));
        }
    }
    Ok(changes)
}
