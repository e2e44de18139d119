//! One-shot upload of guest-mode data into an authenticated cloud account.
//!
//! The pipeline runs in the fixed order given by [`MigrationStage::PIPELINE`].
//! Only a failure to provision the cloud user aborts it; per-entity failures
//! become [`SkipReason`]s and the run continues. Local data is deleted only
//! at the end of a run that did not abort.

pub mod allocations;
pub mod balance;
pub mod gate;
pub mod goals;
pub mod report;
pub mod shifts;
pub mod snapshot;
pub mod user;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::local::LocalStore;
use crate::models::MigrationSnapshot;
use crate::store::CloudStore;

pub use gate::{GateOutcome, LogNotifier, MigrationGate, MigrationNotifier, MigrationSummary};
pub use report::{
    EntityKind, EntityOutcome, MigrationResult, ReconcileReport, SkipReason, SkippedEntity,
};

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// The cloud user row could not be created. Nothing else is attempted.
    #[error("could not provision cloud user {user_id}: {message}")]
    UserProvisioning { user_id: String, message: String },
    #[error("balance merge failed: {0}")]
    BalanceMerge(String),
    #[error("could not clear local data: {0}")]
    LocalCleanup(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStage {
    EnsureUser,
    Goals,
    Shifts,
    Allocations,
    Balance,
    ClearLocal,
}

impl MigrationStage {
    /// Execution order.
    pub const PIPELINE: [MigrationStage; 6] = [
        MigrationStage::EnsureUser,
        MigrationStage::Goals,
        MigrationStage::Shifts,
        MigrationStage::Allocations,
        MigrationStage::Balance,
        MigrationStage::ClearLocal,
    ];

    /// Stages whose results this stage reads.
    #[must_use]
    pub fn depends_on(self) -> &'static [MigrationStage] {
        match self {
            MigrationStage::EnsureUser => &[],
            MigrationStage::Goals | MigrationStage::Shifts => &[MigrationStage::EnsureUser],
            MigrationStage::Allocations | MigrationStage::Balance => {
                &[MigrationStage::Goals, MigrationStage::Shifts]
            }
            MigrationStage::ClearLocal => &[MigrationStage::Allocations, MigrationStage::Balance],
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MigrationStage::EnsureUser => "ensure_user",
            MigrationStage::Goals => "goals",
            MigrationStage::Shifts => "shifts",
            MigrationStage::Allocations => "allocations",
            MigrationStage::Balance => "balance",
            MigrationStage::ClearLocal => "clear_local",
        }
    }
}

impl fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reports collected while one run walks the pipeline.
struct RunState {
    goals: ReconcileReport,
    shifts: ReconcileReport,
    allocations: ReconcileReport,
}

impl RunState {
    fn new() -> Self {
        Self {
            goals: ReconcileReport::new(EntityKind::Goal),
            shifts: ReconcileReport::new(EntityKind::Shift),
            allocations: ReconcileReport::new(EntityKind::Allocation),
        }
    }

    fn into_result(self, error: Option<String>) -> MigrationResult {
        let mut result = MigrationResult {
            success: error.is_none(),
            migrated_goals: self.goals.inserted,
            migrated_shifts: self.shifts.inserted,
            migrated_allocations: self.allocations.inserted,
            error,
            skipped: Vec::new(),
        };
        for report in [self.goals, self.shifts, self.allocations] {
            result.skipped.extend(report.skipped);
        }
        result
    }
}

/// Runs the reconciliation pipeline. Not single-flight on its own; go
/// through [`MigrationGate`] for that.
#[derive(Clone)]
pub struct MigrationEngine {
    local: LocalStore,
    cloud: Arc<dyn CloudStore>,
}

impl MigrationEngine {
    pub fn new(local: LocalStore, cloud: Arc<dyn CloudStore>) -> Self {
        Self { local, cloud }
    }

    #[must_use]
    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    /// Migrate guest data into `user_id`'s cloud account.
    ///
    /// A passed snapshot is used as-is; without one the local store is read.
    /// An absent or empty snapshot returns a successful no-op without
    /// touching either store.
    pub async fn run(&self, user_id: &str, snapshot: Option<MigrationSnapshot>) -> MigrationResult {
        let snapshot = match snapshot {
            Some(snapshot) => snapshot.is_present().then_some(snapshot),
            None => snapshot::read_snapshot(&self.local).await,
        };
        let Some(snapshot) = snapshot else {
            info!(user_id, "no local data to migrate");
            return MigrationResult::noop();
        };

        info!(
            user_id,
            goals = snapshot.goals.len(),
            shifts = snapshot.shifts.len(),
            allocations = snapshot.allocations.len(),
            balance = snapshot.balance,
            "starting migration"
        );

        let mut state = RunState::new();
        for stage in MigrationStage::PIPELINE {
            debug!(user_id, %stage, "stage started");
            if let Err(e) = self.run_stage(stage, user_id, &snapshot, &mut state).await {
                error!(user_id, %stage, error = %e, "migration aborted, local data kept");
                let result = match e {
                    // Nothing was written past the user check
                    MigrationError::UserProvisioning { .. } => RunState::new(),
                    _ => state,
                };
                return result.into_result(Some(e.to_string()));
            }
        }

        let result = state.into_result(None);
        info!(
            user_id,
            migrated_goals = result.migrated_goals,
            migrated_shifts = result.migrated_shifts,
            migrated_allocations = result.migrated_allocations,
            skipped = result.skipped.len(),
            "migration finished"
        );
        result
    }

    async fn run_stage(
        &self,
        stage: MigrationStage,
        user_id: &str,
        snapshot: &MigrationSnapshot,
        state: &mut RunState,
    ) -> Result<(), MigrationError> {
        let cloud = self.cloud.as_ref();
        match stage {
            MigrationStage::EnsureUser => {
                // The local balance arrives through the balance stage, not here
                let provision = user::ensure_user_exists(cloud, user_id, 0.0).await?;
                debug!(user_id, ?provision, "cloud user ready");
            }
            MigrationStage::Goals => {
                state.goals = goals::migrate_goals(cloud, user_id, &snapshot.goals).await;
            }
            MigrationStage::Shifts => {
                state.shifts = shifts::migrate_shifts(cloud, user_id, &snapshot.shifts).await;
            }
            MigrationStage::Allocations => {
                state.allocations = allocations::migrate_allocations(
                    cloud,
                    &snapshot.allocations,
                    &state.goals,
                    &state.shifts,
                )
                .await;
            }
            MigrationStage::Balance => {
                balance::merge_balance(
                    cloud,
                    user_id,
                    snapshot.balance,
                    state.goals.inserted,
                    state.shifts.inserted,
                )
                .await?;
            }
            MigrationStage::ClearLocal => {
                self.local
                    .clear_all()
                    .await
                    .map_err(|e| MigrationError::LocalCleanup(format!("{e:#}")))?;
                info!(user_id, "local data cleared");
            }
        }
        Ok(())
    }
}
