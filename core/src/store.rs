//! Storage ports used by the guest ledger and the migration engine.
//!
//! Both stores are awaited one call at a time. Implementations must be safe to
//! share between tasks; the SQLite-backed ones serialize access behind a mutex.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{
    Goal, GoalAllocation, NewCloudAllocation, NewCloudGoal, NewCloudShift, Shift, User,
};

/// On-device document store: opaque string blobs addressed by key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Remove every listed key. Missing keys are ignored.
    async fn multi_remove(&self, keys: &[&str]) -> Result<()>;
}

/// The authenticated account's relational store.
///
/// Every write is its own round trip; callers get no transaction spanning
/// several calls.
#[async_trait]
pub trait CloudStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;
    async fn insert_user(&self, user_id: &str, balance: f64) -> Result<User>;
    async fn update_user_balance(&self, user_id: &str, balance: f64) -> Result<()>;

    async fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>>;
    async fn insert_goal(&self, goal: &NewCloudGoal) -> Result<Goal>;

    async fn list_shifts(&self, user_id: &str) -> Result<Vec<Shift>>;
    /// Shifts whose scheduled date falls within `from..=to`.
    async fn list_shifts_between(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Shift>>;
    async fn insert_shift(&self, shift: &NewCloudShift) -> Result<Shift>;

    async fn find_allocation(&self, shift_id: &str, goal_id: &str)
    -> Result<Option<GoalAllocation>>;
    async fn insert_allocation(&self, allocation: &NewCloudAllocation) -> Result<GoalAllocation>;
    async fn list_allocations(&self, user_id: &str) -> Result<Vec<GoalAllocation>>;
}
