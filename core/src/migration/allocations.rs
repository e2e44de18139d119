use tracing::info;

use super::report::{EntityKind, EntityOutcome, ReconcileReport, SkipReason};
use crate::models::{GoalAllocation, NewCloudAllocation};
use crate::store::CloudStore;

/// Migrate allocations by rewriting their local references through the goal
/// and shift mappings. Runs only after both of those reconcilers.
///
/// An allocation whose shift or goal has no cloud counterpart is skipped.
pub async fn migrate_allocations(
    cloud: &dyn CloudStore,
    local_allocations: &[GoalAllocation],
    goals: &ReconcileReport,
    shifts: &ReconcileReport,
) -> ReconcileReport {
    let mut report = ReconcileReport::new(EntityKind::Allocation);

    for allocation in local_allocations {
        let outcome = migrate_one(cloud, allocation, goals, shifts).await;
        report.record(&allocation.id, outcome);
    }

    if !local_allocations.is_empty() {
        info!(
            inserted = report.inserted,
            matched = report.matched,
            skipped = report.skipped.len(),
            "allocations reconciled"
        );
    }
    report
}

async fn migrate_one(
    cloud: &dyn CloudStore,
    allocation: &GoalAllocation,
    goals: &ReconcileReport,
    shifts: &ReconcileReport,
) -> EntityOutcome {
    let Some(shift_id) = shifts.cloud_id(&allocation.shift_id) else {
        return EntityOutcome::Skipped(SkipReason::UnresolvedShift(allocation.shift_id.clone()));
    };
    let Some(goal_id) = goals.cloud_id(&allocation.goal_id) else {
        return EntityOutcome::Skipped(SkipReason::UnresolvedGoal(allocation.goal_id.clone()));
    };

    match cloud.find_allocation(shift_id, goal_id).await {
        Ok(Some(existing)) => return EntityOutcome::Matched(existing.id),
        Ok(None) => {}
        Err(e) => return EntityOutcome::Skipped(SkipReason::LookupFailed(format!("{e:#}"))),
    }

    let new = NewCloudAllocation {
        shift_id: shift_id.to_string(),
        goal_id: goal_id.to_string(),
        amount: allocation.amount,
    };
    match cloud.insert_allocation(&new).await {
        Ok(created) => EntityOutcome::Inserted(created.id),
        Err(e) => EntityOutcome::Skipped(SkipReason::InsertFailed(format!("{e:#}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteCloud;
    use crate::migration::goals::migrate_goals;
    use crate::migration::shifts::migrate_shifts;
    use crate::migration::testing::{FaultyCloud, local_allocation, local_goal, local_shift};
    use crate::models::ShiftType;

    async fn reconciled(cloud: &dyn CloudStore) -> (ReconcileReport, ReconcileReport) {
        cloud.insert_user("u1", 0.0).await.unwrap();
        let goals = migrate_goals(cloud, "u1", &[local_goal("g1", "Trip", 1000.0)]).await;
        let shifts =
            migrate_shifts(cloud, "u1", &[local_shift("s1", "2024-06-10", ShiftType::Day)]).await;
        (goals, shifts)
    }

    #[tokio::test]
    async fn test_rewrites_references_to_cloud_ids() {
        let cloud = SqliteCloud::open_in_memory().unwrap();
        let (goals, shifts) = reconciled(&cloud).await;

        let report = migrate_allocations(
            &cloud,
            &[local_allocation("a1", "s1", "g1", 15.0)],
            &goals,
            &shifts,
        )
        .await;

        assert_eq!(report.inserted, 1);
        let stored = cloud.list_allocations("u1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(Some(stored[0].goal_id.as_str()), goals.cloud_id("g1"));
        assert_eq!(Some(stored[0].shift_id.as_str()), shifts.cloud_id("s1"));
        assert!((stored[0].amount - 15.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_existing_pair_is_matched() {
        let cloud = SqliteCloud::open_in_memory().unwrap();
        let (goals, shifts) = reconciled(&cloud).await;
        let allocations = [local_allocation("a1", "s1", "g1", 15.0)];

        migrate_allocations(&cloud, &allocations, &goals, &shifts).await;
        let again = migrate_allocations(&cloud, &allocations, &goals, &shifts).await;

        assert_eq!(again.inserted, 0);
        assert_eq!(again.matched, 1);
        assert_eq!(cloud.list_allocations("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unresolved_references_are_skipped() {
        let cloud = SqliteCloud::open_in_memory().unwrap();
        let (goals, shifts) = reconciled(&cloud).await;

        let report = migrate_allocations(
            &cloud,
            &[
                local_allocation("a1", "s1", "missing-goal", 10.0),
                local_allocation("a2", "missing-shift", "g1", 10.0),
            ],
            &goals,
            &shifts,
        )
        .await;

        assert_eq!(report.inserted, 0);
        assert_eq!(
            report.skipped[0].reason,
            SkipReason::UnresolvedGoal("missing-goal".to_string())
        );
        assert_eq!(
            report.skipped[1].reason,
            SkipReason::UnresolvedShift("missing-shift".to_string())
        );
        assert!(cloud.list_allocations("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failure_skips_without_insert() {
        let cloud = FaultyCloud::new();
        let (goals, shifts) = reconciled(&cloud).await;
        cloud.fail_allocation_lookup();
        let writes_before = cloud.write_count();

        let report = migrate_allocations(
            &cloud,
            &[local_allocation("a1", "s1", "g1", 15.0)],
            &goals,
            &shifts,
        )
        .await;

        assert!(matches!(report.skipped[0].reason, SkipReason::LookupFailed(_)));
        assert_eq!(cloud.write_count(), writes_before);
    }
}
