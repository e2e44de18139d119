use anyhow::Result;
use tracing::{debug, warn};

use crate::local::LocalStore;
use crate::models::MigrationSnapshot;

/// Capture the guest store as an immutable snapshot.
///
/// Returns `None` when the has-local-data flag is unset, when the captured
/// data is empty, or when any read fails.
pub async fn read_snapshot(local: &LocalStore) -> Option<MigrationSnapshot> {
    match try_read_snapshot(local).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "could not read local data, treating as nothing to migrate");
            None
        }
    }
}

async fn try_read_snapshot(local: &LocalStore) -> Result<Option<MigrationSnapshot>> {
    if !local.has_local_data().await? {
        debug!("no local data flag set");
        return Ok(None);
    }

    let snapshot = MigrationSnapshot {
        balance: local.balance().await?,
        goals: local.goals().await?,
        shifts: local.shifts().await?,
        allocations: local.allocations().await?,
    };

    if !snapshot.is_present() {
        debug!("local data flag set but store is empty");
        return Ok(None);
    }
    Ok(Some(snapshot))
}
