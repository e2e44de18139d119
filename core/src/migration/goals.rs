use std::collections::HashMap;

use tracing::info;

use super::report::{EntityKind, EntityOutcome, ReconcileReport, SkipReason};
use crate::models::{Goal, NewCloudGoal};
use crate::store::CloudStore;

/// Natural key of a goal within one user's scope: exact name and target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct GoalKey {
    name: String,
    target_bits: u64,
}

impl GoalKey {
    pub(crate) fn of(goal: &Goal) -> Self {
        Self::new(&goal.name, goal.target_amount)
    }

    fn new(name: &str, target_amount: f64) -> Self {
        // -0.0 and 0.0 are the same amount
        let target = if target_amount == 0.0 { 0.0 } else { target_amount };
        Self {
            name: name.to_string(),
            target_bits: target.to_bits(),
        }
    }
}

/// Migrate local goals into the user's cloud goals, reusing any cloud goal
/// that already has the same natural key.
pub async fn migrate_goals(
    cloud: &dyn CloudStore,
    user_id: &str,
    local_goals: &[Goal],
) -> ReconcileReport {
    let mut report = ReconcileReport::new(EntityKind::Goal);
    if local_goals.is_empty() {
        return report;
    }

    let mut existing: HashMap<GoalKey, String> = match cloud.list_goals(user_id).await {
        Ok(goals) => goals
            .into_iter()
            .map(|g| (GoalKey::of(&g), g.id))
            .collect(),
        Err(e) => {
            // Without the existing rows every insert risks a duplicate
            let reason = SkipReason::LookupFailed(format!("{e:#}"));
            for goal in local_goals {
                report.record(&goal.id, EntityOutcome::Skipped(reason.clone()));
            }
            return report;
        }
    };

    for goal in local_goals {
        let key = GoalKey::of(goal);
        let outcome = if let Some(cloud_id) = existing.get(&key) {
            EntityOutcome::Matched(cloud_id.clone())
        } else {
            match cloud.insert_goal(&NewCloudGoal::from_local(user_id, goal)).await {
                Ok(created) => {
                    // Later local duplicates of this key rejoin the new row
                    existing.insert(key, created.id.clone());
                    EntityOutcome::Inserted(created.id)
                }
                Err(e) => EntityOutcome::Skipped(SkipReason::InsertFailed(format!("{e:#}"))),
            }
        };
        report.record(&goal.id, outcome);
    }

    info!(
        user_id,
        inserted = report.inserted,
        matched = report.matched,
        skipped = report.skipped.len(),
        "goals reconciled"
    );
    report
}
