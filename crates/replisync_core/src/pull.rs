//! Pull diff engine.

use crate::entries;
use crate::error::{CoreError, CoreResult};
use crate::ledger;
use crate::space;
use replisync_protocol::{PullRequest, PullResponse};
use replisync_storage::StoreTransaction;
use tracing::{debug, warn};

/// Computes the changes a client needs to catch up from its cookie.
///
/// The patch holds every entry stamped after the cookie: live entries as
/// puts, tombstones as deletes. The mutation ID map lists every known
/// client of the group. A missing cookie means the beginning of time; a
/// cookie ahead of the partition is treated the same way.
///
/// # Errors
///
/// Returns [`CoreError::UnknownPartition`] if the partition was never
/// written.
pub fn compute_pull(
    tx: &mut dyn StoreTransaction,
    request: &PullRequest,
) -> CoreResult<PullResponse> {
    let space_id = request.space_id.as_str();
    let version = space::current_version(tx, space_id)?
        .ok_or_else(|| CoreError::UnknownPartition(space_id.to_string()))?;

    let mut since = request.cookie.unwrap_or(0);
    if since > version {
        warn!(
            space_id,
            cookie = since,
            version,
            "Cookie is ahead of partition, sending full state"
        );
        since = 0;
    }

    let patch = entries::changes_since(tx, space_id, since)?;
    let last_mutation_id_changes = ledger::last_mutation_ids(tx, &request.client_group_id)?;

    debug!(
        space_id,
        client_group_id = %request.client_group_id,
        since,
        version,
        patch = patch.len(),
        "Pull computed"
    );

    Ok(PullResponse {
        cookie: version,
        last_mutation_id_changes,
        patch,
    })
}
