//! Guest-mode data kept on the device.
//!
//! Each collection is one JSON document in the key-value store. Every write
//! raises the has-local-data flag that the migration snapshot reader checks.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::models::{
    EarningsReceipt, Goal, GoalAllocation, GoalStatus, LOCAL_USER_ID, NewGoal, NewShift, Shift,
    ShiftStatus, User, round_cents, shift_window, validate_allocation_total, validate_earnings,
    validate_new_goal,
};
use crate::store::KeyValueStore;

pub const USER_KEY: &str = "@shiftbank/user";
pub const GOALS_KEY: &str = "@shiftbank/goals";
pub const SHIFTS_KEY: &str = "@shiftbank/shifts";
pub const ALLOCATIONS_KEY: &str = "@shiftbank/allocations";
pub const HAS_LOCAL_DATA_KEY: &str = "@shiftbank/has_local_data";

/// Every key the guest store owns.
pub const ALL_KEYS: [&str; 5] = [
    USER_KEY,
    GOALS_KEY,
    SHIFTS_KEY,
    ALLOCATIONS_KEY,
    HAS_LOCAL_DATA_KEY,
];

#[derive(Clone)]
pub struct LocalStore {
    kv: Arc<dyn KeyValueStore>,
}

impl LocalStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.kv.get(key).await? {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("Corrupt local data under '{key}'"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.kv.set(key, &raw).await?;
        self.kv.set(HAS_LOCAL_DATA_KEY, "true").await
    }

    // --- Reads ---

    pub async fn has_local_data(&self) -> Result<bool> {
        Ok(self.kv.get(HAS_LOCAL_DATA_KEY).await?.as_deref() == Some("true"))
    }

    /// The guest user, created on first read with a zero balance.
    pub async fn user(&self) -> Result<User> {
        Ok(self.read_json(USER_KEY).await?.unwrap_or_else(|| User {
            id: LOCAL_USER_ID.to_string(),
            balance: 0.0,
            created_at: Utc::now().to_rfc3339(),
        }))
    }

    pub async fn balance(&self) -> Result<f64> {
        Ok(self.user().await?.balance)
    }

    pub async fn goals(&self) -> Result<Vec<Goal>> {
        Ok(self.read_json(GOALS_KEY).await?.unwrap_or_default())
    }

    pub async fn shifts(&self) -> Result<Vec<Shift>> {
        Ok(self.read_json(SHIFTS_KEY).await?.unwrap_or_default())
    }

    pub async fn allocations(&self) -> Result<Vec<GoalAllocation>> {
        Ok(self.read_json(ALLOCATIONS_KEY).await?.unwrap_or_default())
    }

    // --- Goals ---

    pub async fn create_goal(&self, new: &NewGoal) -> Result<Goal> {
        validate_new_goal(new)?;
        let mut goals = self.goals().await?;
        let now = Utc::now().to_rfc3339();
        let goal = Goal {
            id: Uuid::new_v4().to_string(),
            user_id: LOCAL_USER_ID.to_string(),
            name: new.name.trim().to_string(),
            icon: new.icon.clone(),
            target_amount: new.target_amount,
            current_amount: 0.0,
            status: GoalStatus::Active,
            is_primary: goals.is_empty(),
            order_index: goals.iter().map(|g| g.order_index).max().map_or(0, |m| m + 1),
            allocation_percentage: new.allocation_percentage,
            deadline: new.deadline,
            completed_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        goals.push(goal.clone());
        validate_allocation_total(&goals)?;
        self.write_json(GOALS_KEY, &goals).await?;
        Ok(goal)
    }

    /// Make `goal_id` the only primary goal.
    pub async fn set_primary_goal(&self, goal_id: &str) -> Result<Goal> {
        let mut goals = self.goals().await?;
        if !goals.iter().any(|g| g.id == goal_id) {
            bail!("Goal '{goal_id}' not found");
        }
        let now = Utc::now().to_rfc3339();
        for goal in &mut goals {
            let primary = goal.id == goal_id;
            if goal.is_primary != primary {
                goal.is_primary = primary;
                goal.updated_at.clone_from(&now);
            }
        }
        self.write_json(GOALS_KEY, &goals).await?;
        find_goal(&goals, goal_id)
    }

    pub async fn set_goal_status(&self, goal_id: &str, status: GoalStatus) -> Result<Goal> {
        let mut goals = self.goals().await?;
        let goal = goals
            .iter_mut()
            .find(|g| g.id == goal_id)
            .with_context(|| format!("Goal '{goal_id}' not found"))?;
        let now = Utc::now().to_rfc3339();
        goal.status = status;
        goal.completed_at = match status {
            GoalStatus::Completed => goal.completed_at.take().or_else(|| Some(now.clone())),
            GoalStatus::Active => None,
            GoalStatus::Hidden => goal.completed_at.take(),
        };
        goal.updated_at = now;
        validate_allocation_total(&goals)?;
        self.write_json(GOALS_KEY, &goals).await?;
        find_goal(&goals, goal_id)
    }

    // --- Shifts ---

    pub async fn schedule_shift(&self, new: &NewShift) -> Result<Shift> {
        let mut shifts = self.shifts().await?;
        if shifts.iter().any(|s| {
            s.scheduled_date == new.scheduled_date
                && s.shift_type == new.shift_type
                && s.operation_type == new.operation_type
        }) {
            bail!(
                "A {} {} shift is already scheduled on {}",
                new.shift_type,
                new.operation_type,
                new.scheduled_date
            );
        }
        let (start, end) = shift_window(new.scheduled_date, new.shift_type);
        let now = Utc::now().to_rfc3339();
        let shift = Shift {
            id: Uuid::new_v4().to_string(),
            user_id: LOCAL_USER_ID.to_string(),
            operation_type: new.operation_type,
            shift_type: new.shift_type,
            scheduled_date: new.scheduled_date,
            scheduled_start: start,
            scheduled_end: end,
            status: ShiftStatus::Scheduled,
            earnings: None,
            earnings_recorded_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        shifts.push(shift.clone());
        shifts.sort_by_key(|s| s.scheduled_start);
        self.write_json(SHIFTS_KEY, &shifts).await?;
        Ok(shift)
    }

    pub async fn set_shift_status(&self, shift_id: &str, status: ShiftStatus) -> Result<Shift> {
        let mut shifts = self.shifts().await?;
        let shift = shifts
            .iter_mut()
            .find(|s| s.id == shift_id)
            .with_context(|| format!("Shift '{shift_id}' not found"))?;
        shift.status = status;
        shift.updated_at = Utc::now().to_rfc3339();
        let updated = shift.clone();
        self.write_json(SHIFTS_KEY, &shifts).await?;
        Ok(updated)
    }

    /// Record a shift's pay and route it: each active goal receives its
    /// allocation percentage, the rest goes to the balance.
    pub async fn record_earnings(&self, shift_id: &str, amount: f64) -> Result<EarningsReceipt> {
        validate_earnings(amount)?;
        let mut shifts = self.shifts().await?;
        let mut goals = self.goals().await?;
        let mut allocations = self.allocations().await?;
        let mut user = self.user().await?;

        let shift = shifts
            .iter_mut()
            .find(|s| s.id == shift_id)
            .with_context(|| format!("Shift '{shift_id}' not found"))?;
        if shift.earnings.is_some() {
            bail!("Earnings were already recorded for shift '{shift_id}'");
        }
        if matches!(shift.status, ShiftStatus::Canceled | ShiftStatus::NoShow) {
            bail!("Cannot record earnings for a {} shift", shift.status);
        }

        let now = Utc::now().to_rfc3339();
        shift.status = ShiftStatus::Completed;
        shift.earnings = Some(amount);
        shift.earnings_recorded_at = Some(now.clone());
        shift.updated_at.clone_from(&now);
        let shift = shift.clone();

        let mut created = Vec::new();
        let mut completed_goals = Vec::new();
        let mut allocated = 0.0;
        for goal in goals
            .iter_mut()
            .filter(|g| g.status == GoalStatus::Active && g.allocation_percentage > 0.0)
        {
            let share = round_cents(amount * goal.allocation_percentage / 100.0);
            if share <= 0.0 {
                continue;
            }
            allocated += share;
            goal.current_amount = round_cents(goal.current_amount + share);
            goal.updated_at.clone_from(&now);
            if goal.current_amount >= goal.target_amount {
                goal.status = GoalStatus::Completed;
                goal.completed_at = Some(now.clone());
                completed_goals.push(goal.id.clone());
            }
            created.push(GoalAllocation {
                id: Uuid::new_v4().to_string(),
                shift_id: shift.id.clone(),
                goal_id: goal.id.clone(),
                amount: share,
                created_at: now.clone(),
            });
        }

        let to_balance = round_cents(amount - allocated).max(0.0);
        user.balance = round_cents(user.balance + to_balance);
        allocations.extend(created.iter().cloned());

        self.write_json(SHIFTS_KEY, &shifts).await?;
        self.write_json(GOALS_KEY, &goals).await?;
        self.write_json(ALLOCATIONS_KEY, &allocations).await?;
        self.write_json(USER_KEY, &user).await?;

        Ok(EarningsReceipt {
            shift,
            allocations: created,
            to_balance,
            completed_goals,
        })
    }

    /// Remove every guest-mode key.
    pub async fn clear_all(&self) -> Result<()> {
        self.kv.multi_remove(&ALL_KEYS).await
    }
}

fn find_goal(goals: &[Goal], goal_id: &str) -> Result<Goal> {
    goals
        .iter()
        .find(|g| g.id == goal_id)
        .cloned()
        .with_context(|| format!("Goal '{goal_id}' not found"))
}
