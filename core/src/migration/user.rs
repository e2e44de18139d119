use tracing::{info, warn};

use super::MigrationError;
use crate::store::CloudStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserProvision {
    Existing,
    Created,
}

/// Make sure the cloud has a user row for `user_id` before any entity
/// references it. An existing row is left untouched.
///
/// A failed insert is the engine's one fatal condition.
pub async fn ensure_user_exists(
    cloud: &dyn CloudStore,
    user_id: &str,
    initial_balance: f64,
) -> Result<UserProvision, MigrationError> {
    match cloud.get_user(user_id).await {
        Ok(Some(_)) => return Ok(UserProvision::Existing),
        Ok(None) => {}
        // The insert below decides whether the user is really missing
        Err(e) => warn!(user_id, error = %format!("{e:#}"), "user lookup failed"),
    }

    cloud
        .insert_user(user_id, initial_balance)
        .await
        .map_err(|e| MigrationError::UserProvisioning {
            user_id: user_id.to_string(),
            message: format!("{e:#}"),
        })?;
    info!(user_id, "created cloud user");
    Ok(UserProvision::Created)
}
