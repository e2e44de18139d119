//! Fault-injecting cloud store for engine tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Notify;

use crate::db::SqliteCloud;
use crate::models::{
    Goal, GoalAllocation, GoalIcon, GoalStatus, LOCAL_USER_ID, NewCloudAllocation, NewCloudGoal,
    NewCloudShift, OperationType, Shift, ShiftStatus, ShiftType, User, shift_window,
};
use crate::store::CloudStore;

pub(crate) fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub(crate) fn local_goal(id: &str, name: &str, target: f64) -> Goal {
    Goal {
        id: id.to_string(),
        user_id: LOCAL_USER_ID.to_string(),
        name: name.to_string(),
        icon: GoalIcon {
            key: "plane".to_string(),
            color: "#000000".to_string(),
            background: "#FFEE00".to_string(),
        },
        target_amount: target,
        current_amount: 200.0,
        status: GoalStatus::Active,
        is_primary: false,
        order_index: 1,
        allocation_percentage: 15.0,
        deadline: None,
        completed_at: None,
        created_at: "2024-06-01T00:00:00Z".to_string(),
        updated_at: "2024-06-01T00:00:00Z".to_string(),
    }
}

pub(crate) fn local_shift(id: &str, day: &str, shift_type: ShiftType) -> Shift {
    let scheduled_date = date(day);
    let (scheduled_start, scheduled_end) = shift_window(scheduled_date, shift_type);
    Shift {
        id: id.to_string(),
        user_id: LOCAL_USER_ID.to_string(),
        operation_type: OperationType::Returns,
        shift_type,
        scheduled_date,
        scheduled_start,
        scheduled_end,
        status: ShiftStatus::Completed,
        earnings: Some(100.0),
        earnings_recorded_at: Some("2024-06-10T21:00:00Z".to_string()),
        created_at: "2024-06-01T00:00:00Z".to_string(),
        updated_at: "2024-06-10T21:00:00Z".to_string(),
    }
}

pub(crate) fn local_allocation(id: &str, shift_id: &str, goal_id: &str, amount: f64) -> GoalAllocation {
    GoalAllocation {
        id: id.to_string(),
        shift_id: shift_id.to_string(),
        goal_id: goal_id.to_string(),
        amount,
        created_at: "2024-06-10T21:00:00Z".to_string(),
    }
}

#[derive(Default)]
struct Faults {
    user_insert: AtomicBool,
    user_lookup: AtomicBool,
    goal_lookup: AtomicBool,
    shift_lookup: AtomicBool,
    allocation_lookup: AtomicBool,
    balance_update: AtomicBool,
    goal_names: Mutex<HashSet<String>>,
    shift_dates: Mutex<HashSet<NaiveDate>>,
}

/// Hooks that hold the first `get_user` call until released.
pub(crate) struct Pause {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Clone)]
pub(crate) struct FaultyCloud {
    pub inner: SqliteCloud,
    faults: Arc<Faults>,
    pub user_lookups: Arc<AtomicUsize>,
    pub writes: Arc<AtomicUsize>,
    pause: Option<Arc<Pause>>,
}

impl FaultyCloud {
    pub fn new() -> Self {
        Self {
            inner: SqliteCloud::open_in_memory().unwrap(),
            faults: Arc::new(Faults::default()),
            user_lookups: Arc::new(AtomicUsize::new(0)),
            writes: Arc::new(AtomicUsize::new(0)),
            pause: None,
        }
    }

    pub fn with_pause(mut self) -> (Self, Arc<Pause>) {
        let pause = Arc::new(Pause {
            entered: Notify::new(),
            release: Notify::new(),
        });
        self.pause = Some(pause.clone());
        (self, pause)
    }

    pub fn fail_user_insert(&self) {
        self.faults.user_insert.store(true, Ordering::SeqCst);
    }

    pub fn fail_user_lookup(&self) {
        self.faults.user_lookup.store(true, Ordering::SeqCst);
    }

    pub fn fail_goal_lookup(&self) {
        self.faults.goal_lookup.store(true, Ordering::SeqCst);
    }

    pub fn fail_shift_lookup(&self) {
        self.faults.shift_lookup.store(true, Ordering::SeqCst);
    }

    pub fn fail_allocation_lookup(&self) {
        self.faults.allocation_lookup.store(true, Ordering::SeqCst);
    }

    pub fn fail_balance_update(&self) {
        self.faults.balance_update.store(true, Ordering::SeqCst);
    }

    pub fn fail_goal_insert(&self, name: &str) {
        self.faults.goal_names.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_shift_insert(&self, date: NaiveDate) {
        self.faults.shift_dates.lock().unwrap().insert(date);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CloudStore for FaultyCloud {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let previous = self.user_lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(pause) = self.pause.as_ref().filter(|_| previous == 0) {
            pause.entered.notify_one();
            pause.release.notified().await;
        }
        if self.faults.user_lookup.load(Ordering::SeqCst) {
            bail!("users select timed out");
        }
        self.inner.get_user(user_id).await
    }

    async fn insert_user(&self, user_id: &str, balance: f64) -> Result<User> {
        if self.faults.user_insert.load(Ordering::SeqCst) {
            bail!("permission denied for table users");
        }
        self.inner.insert_user(user_id, balance).await
    }

    async fn update_user_balance(&self, user_id: &str, balance: f64) -> Result<()> {
        if self.faults.balance_update.load(Ordering::SeqCst) {
            bail!("users update rejected");
        }
        self.inner.update_user_balance(user_id, balance).await
    }

    async fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>> {
        if self.faults.goal_lookup.load(Ordering::SeqCst) {
            bail!("goals select failed");
        }
        self.inner.list_goals(user_id).await
    }

    async fn insert_goal(&self, goal: &NewCloudGoal) -> Result<Goal> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let blocked = self.faults.goal_names.lock().unwrap().contains(&goal.name);
        if blocked {
            bail!("goals insert failed for '{}'", goal.name);
        }
        self.inner.insert_goal(goal).await
    }

    async fn list_shifts(&self, user_id: &str) -> Result<Vec<Shift>> {
        self.inner.list_shifts(user_id).await
    }

    async fn list_shifts_between(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Shift>> {
        if self.faults.shift_lookup.load(Ordering::SeqCst) {
            bail!("shifts select failed");
        }
        self.inner.list_shifts_between(user_id, from, to).await
    }

    async fn insert_shift(&self, shift: &NewCloudShift) -> Result<Shift> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let blocked = self
            .faults
            .shift_dates
            .lock()
            .unwrap()
            .contains(&shift.scheduled_date);
        if blocked {
            bail!("shifts insert failed for {}", shift.scheduled_date);
        }
        self.inner.insert_shift(shift).await
    }

    async fn find_allocation(
        &self,
        shift_id: &str,
        goal_id: &str,
    ) -> Result<Option<GoalAllocation>> {
        if self.faults.allocation_lookup.load(Ordering::SeqCst) {
            bail!("goal_allocations select failed");
        }
        self.inner.find_allocation(shift_id, goal_id).await
    }

    async fn insert_allocation(&self, allocation: &NewCloudAllocation) -> Result<GoalAllocation> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_allocation(allocation).await
    }

    async fn list_allocations(&self, user_id: &str) -> Result<Vec<GoalAllocation>> {
        self.inner.list_allocations(user_id).await
    }
}
