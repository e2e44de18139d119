use tracing::{debug, info};

use super::MigrationError;
use crate::models::round_cents;
use crate::store::CloudStore;

/// Add the local balance onto the cloud balance.
///
/// Runs only when there is a positive local balance and at least one goal or
/// shift was inserted by this run; a re-run that only matched existing rows
/// must not credit the balance again. Returns the new cloud balance when a
/// merge happened.
///
/// The read and the write are separate calls, so two concurrent merges for
/// one user can lose an increment.
///
/// If the write fails, a retry of the same snapshot inserts nothing and so
/// never merges; that local balance is dropped when the retry clears local
/// data.
pub async fn merge_balance(
    cloud: &dyn CloudStore,
    user_id: &str,
    local_balance: f64,
    migrated_goals: usize,
    migrated_shifts: usize,
) -> Result<Option<f64>, MigrationError> {
    if local_balance <= 0.0 || migrated_goals + migrated_shifts == 0 {
        debug!(user_id, local_balance, "balance merge not needed");
        return Ok(None);
    }

    let current = cloud
        .get_user(user_id)
        .await
        .map_err(|e| MigrationError::BalanceMerge(format!("{e:#}")))?
        .map_or(0.0, |user| user.balance);
    let merged = round_cents(current + local_balance);

    cloud
        .update_user_balance(user_id, merged)
        .await
        .map_err(|e| MigrationError::BalanceMerge(format!("{e:#}")))?;

    info!(user_id, current, local_balance, merged, "merged local balance");
    Ok(Some(merged))
}
