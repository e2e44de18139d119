use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::db::SqliteCloud;
use crate::kv::SqliteKeyValueStore;
use crate::local::LocalStore;
use crate::migration::{GateOutcome, MigrationEngine, MigrationGate, MigrationNotifier};
use crate::models::{
    AuthEvent, CloudSummary, DATE_FORMAT, EarningsReceipt, Goal, GoalAllocation, GoalStatus,
    NewGoal, NewShift, OperationType, Shift, ShiftStatus, ShiftType,
};
use crate::store::CloudStore;

/// Guest-mode ledger plus the migration gate, wired to SQLite stores.
pub struct ShiftbankService {
    local: LocalStore,
    cloud: SqliteCloud,
    gate: MigrationGate,
}

impl ShiftbankService {
    pub fn open(local_path: &Path, cloud_path: &Path) -> Result<Self> {
        let kv = SqliteKeyValueStore::open(local_path)?;
        let cloud = SqliteCloud::open(cloud_path)?;
        Ok(Self::with_stores(kv, cloud))
    }

    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::with_stores(
            SqliteKeyValueStore::open_in_memory()?,
            SqliteCloud::open_in_memory()?,
        ))
    }

    fn with_stores(kv: SqliteKeyValueStore, cloud: SqliteCloud) -> Self {
        let local = LocalStore::new(Arc::new(kv));
        let engine = MigrationEngine::new(local.clone(), Arc::new(cloud.clone()));
        Self {
            local,
            cloud,
            gate: MigrationGate::new(engine),
        }
    }

    // --- Guest-mode goals ---

    pub async fn create_goal(&self, new: &NewGoal) -> Result<Goal> {
        self.local.create_goal(new).await
    }

    /// Goals in display order.
    pub async fn list_goals(&self) -> Result<Vec<Goal>> {
        let mut goals = self.local.goals().await?;
        goals.sort_by_key(|g| g.order_index);
        Ok(goals)
    }

    pub async fn set_primary_goal(&self, goal_id: &str) -> Result<Goal> {
        self.local.set_primary_goal(goal_id).await
    }

    pub async fn hide_goal(&self, goal_id: &str) -> Result<Goal> {
        self.local.set_goal_status(goal_id, GoalStatus::Hidden).await
    }

    pub async fn show_goal(&self, goal_id: &str) -> Result<Goal> {
        self.local.set_goal_status(goal_id, GoalStatus::Active).await
    }

    // --- Guest-mode shifts ---

    pub async fn schedule_shift(
        &self,
        date: &str,
        shift_type: ShiftType,
        operation_type: OperationType,
    ) -> Result<Shift> {
        let scheduled_date = NaiveDate::parse_from_str(date, DATE_FORMAT)
            .with_context(|| format!("Invalid date '{date}', expected YYYY-MM-DD"))?;
        self.local
            .schedule_shift(&NewShift {
                operation_type,
                shift_type,
                scheduled_date,
            })
            .await
    }

    pub async fn list_shifts(&self) -> Result<Vec<Shift>> {
        self.local.shifts().await
    }

    pub async fn set_shift_status(&self, shift_id: &str, status: ShiftStatus) -> Result<Shift> {
        self.local.set_shift_status(shift_id, status).await
    }

    pub async fn record_earnings(&self, shift_id: &str, amount: f64) -> Result<EarningsReceipt> {
        self.local.record_earnings(shift_id, amount).await
    }

    pub async fn list_allocations(&self) -> Result<Vec<GoalAllocation>> {
        self.local.allocations().await
    }

    pub async fn balance(&self) -> Result<f64> {
        self.local.balance().await
    }

    pub async fn has_local_data(&self) -> Result<bool> {
        self.local.has_local_data().await
    }

    // --- Account ---

    pub fn gate(&self) -> &MigrationGate {
        &self.gate
    }

    /// Capture guest data ahead of an auth call, then migrate it into
    /// `user_id`'s account once the event fires.
    pub async fn authenticate(
        &self,
        event: AuthEvent,
        user_id: &str,
        notifier: &dyn MigrationNotifier,
    ) -> GateOutcome {
        self.gate.capture_snapshot().await;
        self.gate.on_auth_event(event, user_id, None, notifier).await
    }

    pub async fn cloud_summary(&self, user_id: &str) -> Result<CloudSummary> {
        Ok(CloudSummary {
            user: self.cloud.get_user(user_id).await?,
            goals: self.cloud.list_goals(user_id).await?,
            shifts: self.cloud.list_shifts(user_id).await?,
            allocations: self.cloud.list_allocations(user_id).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::LogNotifier;
    use crate::models::GoalIcon;

    fn new_goal(name: &str, target: f64, pct: f64) -> NewGoal {
        NewGoal {
            name: name.to_string(),
            icon: GoalIcon::default(),
            target_amount: target,
            allocation_percentage: pct,
            deadline: None,
        }
    }

    #[tokio::test]
    async fn test_guest_ledger_then_sign_in() {
        let svc = ShiftbankService::new_in_memory().unwrap();
        svc.create_goal(&new_goal("Trip", 1000.0, 25.0)).await.unwrap();
        let shift = svc
            .schedule_shift("2024-06-10", ShiftType::Day, OperationType::Returns)
            .await
            .unwrap();
        svc.record_earnings(&shift.id, 200.0).await.unwrap();
        assert!((svc.balance().await.unwrap() - 150.0).abs() < f64::EPSILON);

        let outcome = svc.authenticate(AuthEvent::SignIn, "u1", &LogNotifier).await;

        let GateOutcome::Completed(result) = outcome else {
            panic!("gate should be free");
        };
        assert!(result.success);
        assert_eq!(result.migrated_allocations, 1);
        assert!(!svc.has_local_data().await.unwrap());

        let summary = svc.cloud_summary("u1").await.unwrap();
        assert!((summary.user.unwrap().balance - 150.0).abs() < f64::EPSILON);
        assert_eq!(summary.goals.len(), 1);
        assert_eq!(summary.shifts.len(), 1);
        assert_eq!(summary.allocations.len(), 1);
    }

    #[tokio::test]
    async fn test_hide_and_show_goal() {
        let svc = ShiftbankService::new_in_memory().unwrap();
        let goal = svc.create_goal(&new_goal("Car", 5000.0, 10.0)).await.unwrap();

        assert_eq!(svc.hide_goal(&goal.id).await.unwrap().status, GoalStatus::Hidden);
        assert_eq!(svc.show_goal(&goal.id).await.unwrap().status, GoalStatus::Active);
    }

    #[tokio::test]
    async fn test_schedule_shift_rejects_bad_date() {
        let svc = ShiftbankService::new_in_memory().unwrap();
        let err = svc
            .schedule_shift("10/06/2024", ShiftType::Day, OperationType::Returns)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid date"));
    }

    #[tokio::test]
    async fn test_list_goals_in_display_order() {
        let svc = ShiftbankService::new_in_memory().unwrap();
        svc.create_goal(&new_goal("A", 100.0, 10.0)).await.unwrap();
        svc.create_goal(&new_goal("B", 100.0, 10.0)).await.unwrap();

        let names: Vec<String> = svc
            .list_goals()
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_cloud_summary_for_unknown_user() {
        let svc = ShiftbankService::new_in_memory().unwrap();
        let summary = svc.cloud_summary("nobody").await.unwrap();
        assert!(summary.user.is_none());
        assert!(summary.goals.is_empty());
    }
}
