use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::models::{
    DATE_FORMAT, DATETIME_FORMAT, Goal, GoalAllocation, GoalIcon, NewCloudAllocation,
    NewCloudGoal, NewCloudShift, Shift, User,
};
use crate::store::CloudStore;

const GOAL_COLUMNS: &str = "id, user_id, name, icon_key, icon_color, icon_background,
    target_amount, current_amount, status, is_primary, order_index, allocation_percentage,
    deadline, completed_at, created_at, updated_at";

const SHIFT_COLUMNS: &str = "id, user_id, operation_type, shift_type, scheduled_date,
    scheduled_start, scheduled_end, status, earnings, earnings_recorded_at, created_at, updated_at";

const ALLOCATION_COLUMNS: &str = "id, shift_id, goal_id, amount, created_at";

/// The cloud relational store: `users`, `goals`, `shifts`, `goal_allocations`.
pub struct CloudDatabase {
    conn: Connection,
}

impl CloudDatabase {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open cloud database: {}", path.display()))?;
        let db = CloudDatabase { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = CloudDatabase { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    balance REAL NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS goals (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    icon_key TEXT NOT NULL,
                    icon_color TEXT NOT NULL,
                    icon_background TEXT NOT NULL,
                    target_amount REAL NOT NULL,
                    current_amount REAL NOT NULL DEFAULT 0,
                    status TEXT NOT NULL CHECK (status IN ('active', 'completed', 'hidden')),
                    is_primary INTEGER NOT NULL DEFAULT 0,
                    order_index INTEGER NOT NULL DEFAULT 0,
                    allocation_percentage REAL NOT NULL DEFAULT 0,
                    deadline TEXT,
                    completed_at TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS shifts (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    operation_type TEXT NOT NULL CHECK (operation_type IN ('returns', 'receiving')),
                    shift_type TEXT NOT NULL CHECK (shift_type IN ('day', 'night')),
                    scheduled_date TEXT NOT NULL,
                    scheduled_start TEXT NOT NULL,
                    scheduled_end TEXT NOT NULL,
                    status TEXT NOT NULL,
                    earnings REAL,
                    earnings_recorded_at TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS goal_allocations (
                    id TEXT PRIMARY KEY,
                    shift_id TEXT NOT NULL REFERENCES shifts(id) ON DELETE CASCADE,
                    goal_id TEXT NOT NULL REFERENCES goals(id) ON DELETE CASCADE,
                    amount REAL NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_goals_user ON goals(user_id);
                CREATE INDEX IF NOT EXISTS idx_shifts_user_date ON shifts(user_id, scheduled_date);

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            // Allocation rejoin looks rows up by the (shift, goal) pair
            self.conn.execute_batch(
                "CREATE INDEX IF NOT EXISTS idx_goal_allocations_pair
                     ON goal_allocations(shift_id, goal_id);
                 PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn text_col<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let raw: String = row.get(idx)?;
        raw.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn date_col(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
        let raw: String = row.get(idx)?;
        NaiveDate::parse_from_str(&raw, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn opt_date_col(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
        let raw: Option<String> = row.get(idx)?;
        raw.map(|s| {
            NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })
        })
        .transpose()
    }

    fn datetime_col(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
        let raw: String = row.get(idx)?;
        NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            balance: row.get(1)?,
            created_at: row.get(2)?,
        })
    }

    fn goal_from_row(row: &rusqlite::Row) -> rusqlite::Result<Goal> {
        Ok(Goal {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            icon: GoalIcon {
                key: row.get(3)?,
                color: row.get(4)?,
                background: row.get(5)?,
            },
            target_amount: row.get(6)?,
            current_amount: row.get(7)?,
            status: Self::text_col(row, 8)?,
            is_primary: row.get(9)?,
            order_index: row.get(10)?,
            allocation_percentage: row.get(11)?,
            deadline: Self::opt_date_col(row, 12)?,
            completed_at: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn shift_from_row(row: &rusqlite::Row) -> rusqlite::Result<Shift> {
        Ok(Shift {
            id: row.get(0)?,
            user_id: row.get(1)?,
            operation_type: Self::text_col(row, 2)?,
            shift_type: Self::text_col(row, 3)?,
            scheduled_date: Self::date_col(row, 4)?,
            scheduled_start: Self::datetime_col(row, 5)?,
            scheduled_end: Self::datetime_col(row, 6)?,
            status: Self::text_col(row, 7)?,
            earnings: row.get(8)?,
            earnings_recorded_at: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn allocation_from_row(row: &rusqlite::Row) -> rusqlite::Result<GoalAllocation> {
        Ok(GoalAllocation {
            id: row.get(0)?,
            shift_id: row.get(1)?,
            goal_id: row.get(2)?,
            amount: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    // --- Users ---

    pub fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, balance, created_at FROM users WHERE id = ?1",
                params![user_id],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn insert_user(&self, user_id: &str, balance: f64) -> Result<User> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO users (id, balance, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, balance, now, now],
        )?;
        self.get_user(user_id)?.context("User not found after insert")
    }

    pub fn update_user_balance(&self, user_id: &str, balance: f64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE users SET balance = ?1, updated_at = ?2 WHERE id = ?3",
            params![balance, now, user_id],
        )?;
        if rows == 0 {
            bail!("User '{user_id}' not found");
        }
        Ok(())
    }

    // --- Goals ---

    pub fn get_goal(&self, id: &str) -> Result<Goal> {
        self.conn
            .query_row(
                &format!("SELECT {GOAL_COLUMNS} FROM goals WHERE id = ?1"),
                params![id],
                Self::goal_from_row,
            )
            .context("Goal not found")
    }

    pub fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {GOAL_COLUMNS} FROM goals WHERE user_id = ?1 ORDER BY order_index, created_at"
        ))?;
        let goals = stmt
            .query_map(params![user_id], Self::goal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(goals)
    }

    pub fn insert_goal(&self, goal: &NewCloudGoal) -> Result<Goal> {
        let now = Utc::now().to_rfc3339();
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            &format!(
                "INSERT INTO goals ({GOAL_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ),
            params![
                id,
                goal.user_id,
                goal.name,
                goal.icon.key,
                goal.icon.color,
                goal.icon.background,
                goal.target_amount,
                goal.current_amount,
                goal.status.as_str(),
                goal.is_primary,
                goal.order_index,
                goal.allocation_percentage,
                goal.deadline.map(|d| d.format(DATE_FORMAT).to_string()),
                goal.completed_at,
                now,
                now,
            ],
        )?;
        self.get_goal(&id)
    }

    // --- Shifts ---

    pub fn get_shift(&self, id: &str) -> Result<Shift> {
        self.conn
            .query_row(
                &format!("SELECT {SHIFT_COLUMNS} FROM shifts WHERE id = ?1"),
                params![id],
                Self::shift_from_row,
            )
            .context("Shift not found")
    }

    pub fn list_shifts(&self, user_id: &str) -> Result<Vec<Shift>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SHIFT_COLUMNS} FROM shifts WHERE user_id = ?1 ORDER BY scheduled_start"
        ))?;
        let shifts = stmt
            .query_map(params![user_id], Self::shift_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(shifts)
    }

    pub fn list_shifts_between(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Shift>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SHIFT_COLUMNS} FROM shifts
             WHERE user_id = ?1 AND scheduled_date >= ?2 AND scheduled_date <= ?3
             ORDER BY scheduled_start"
        ))?;
        let shifts = stmt
            .query_map(
                params![
                    user_id,
                    from.format(DATE_FORMAT).to_string(),
                    to.format(DATE_FORMAT).to_string()
                ],
                Self::shift_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(shifts)
    }

    pub fn insert_shift(&self, shift: &NewCloudShift) -> Result<Shift> {
        let now = Utc::now().to_rfc3339();
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            &format!(
                "INSERT INTO shifts ({SHIFT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                id,
                shift.user_id,
                shift.operation_type.as_str(),
                shift.shift_type.as_str(),
                shift.scheduled_date.format(DATE_FORMAT).to_string(),
                shift.scheduled_start.format(DATETIME_FORMAT).to_string(),
                shift.scheduled_end.format(DATETIME_FORMAT).to_string(),
                shift.status.as_str(),
                shift.earnings,
                shift.earnings_recorded_at,
                now,
                now,
            ],
        )?;
        self.get_shift(&id)
    }

    // --- Goal allocations ---

    pub fn find_allocation(&self, shift_id: &str, goal_id: &str) -> Result<Option<GoalAllocation>> {
        let allocation = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ALLOCATION_COLUMNS} FROM goal_allocations
                     WHERE shift_id = ?1 AND goal_id = ?2 LIMIT 1"
                ),
                params![shift_id, goal_id],
                Self::allocation_from_row,
            )
            .optional()?;
        Ok(allocation)
    }

    pub fn insert_allocation(&self, allocation: &NewCloudAllocation) -> Result<GoalAllocation> {
        let now = Utc::now().to_rfc3339();
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            &format!("INSERT INTO goal_allocations ({ALLOCATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
            params![id, allocation.shift_id, allocation.goal_id, allocation.amount, now],
        )?;
        self.conn
            .query_row(
                &format!("SELECT {ALLOCATION_COLUMNS} FROM goal_allocations WHERE id = ?1"),
                params![id],
                Self::allocation_from_row,
            )
            .context("Allocation not found after insert")
    }

    pub fn list_allocations(&self, user_id: &str) -> Result<Vec<GoalAllocation>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.id, a.shift_id, a.goal_id, a.amount, a.created_at
             FROM goal_allocations a
             JOIN shifts s ON s.id = a.shift_id
             WHERE s.user_id = ?1
             ORDER BY a.created_at",
        )?;
        let allocations = stmt
            .query_map(params![user_id], Self::allocation_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(allocations)
    }
}

/// Shareable [`CloudStore`] over a [`CloudDatabase`].
#[derive(Clone)]
pub struct SqliteCloud {
    db: Arc<Mutex<CloudDatabase>>,
}

impl SqliteCloud {
    #[must_use]
    pub fn new(db: CloudDatabase) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(CloudDatabase::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(CloudDatabase::open_in_memory()?))
    }

    fn with_db<T>(&self, f: impl FnOnce(&CloudDatabase) -> Result<T>) -> Result<T> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        f(&db)
    }
}

#[async_trait]
impl CloudStore for SqliteCloud {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.with_db(|db| db.get_user(user_id))
    }

    async fn insert_user(&self, user_id: &str, balance: f64) -> Result<User> {
        self.with_db(|db| db.insert_user(user_id, balance))
    }

    async fn update_user_balance(&self, user_id: &str, balance: f64) -> Result<()> {
        self.with_db(|db| db.update_user_balance(user_id, balance))
    }

    async fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>> {
        self.with_db(|db| db.list_goals(user_id))
    }

    async fn insert_goal(&self, goal: &NewCloudGoal) -> Result<Goal> {
        self.with_db(|db| db.insert_goal(goal))
    }

    async fn list_shifts(&self, user_id: &str) -> Result<Vec<Shift>> {
        self.with_db(|db| db.list_shifts(user_id))
    }

    async fn list_shifts_between(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Shift>> {
        self.with_db(|db| db.list_shifts_between(user_id, from, to))
    }

    async fn insert_shift(&self, shift: &NewCloudShift) -> Result<Shift> {
        self.with_db(|db| db.insert_shift(shift))
    }

    async fn find_allocation(
        &self,
        shift_id: &str,
        goal_id: &str,
    ) -> Result<Option<GoalAllocation>> {
        self.with_db(|db| db.find_allocation(shift_id, goal_id))
    }

    async fn insert_allocation(&self, allocation: &NewCloudAllocation) -> Result<GoalAllocation> {
        self.with_db(|db| db.insert_allocation(allocation))
    }

    async fn list_allocations(&self, user_id: &str) -> Result<Vec<GoalAllocation>> {
        self.with_db(|db| db.list_allocations(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GoalStatus, OperationType, ShiftStatus, ShiftType, shift_window};

    fn sample_goal(user_id: &str) -> NewCloudGoal {
        NewCloudGoal {
            user_id: user_id.to_string(),
            name: "Trip".to_string(),
            icon: GoalIcon::default(),
            target_amount: 1000.0,
            current_amount: 200.0,
            status: GoalStatus::Hidden,
            is_primary: true,
            order_index: 3,
            allocation_percentage: 25.0,
            deadline: NaiveDate::from_ymd_opt(2025, 1, 31),
            completed_at: None,
        }
    }

    fn sample_shift(user_id: &str, date: NaiveDate) -> NewCloudShift {
        let (start, end) = shift_window(date, ShiftType::Night);
        NewCloudShift {
            user_id: user_id.to_string(),
            operation_type: OperationType::Receiving,
            shift_type: ShiftType::Night,
            scheduled_date: date,
            scheduled_start: start,
            scheduled_end: end,
            status: ShiftStatus::Completed,
            earnings: Some(180.0),
            earnings_recorded_at: Some("2024-06-16T08:05:00+00:00".to_string()),
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn test_migration_sets_user_version() {
        let db = CloudDatabase::open_in_memory().unwrap();
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn test_insert_and_get_user() {
        let db = CloudDatabase::open_in_memory().unwrap();
        assert!(db.get_user("u1").unwrap().is_none());

        let user = db.insert_user("u1", 0.0).unwrap();
        assert_eq!(user.id, "u1");
        assert!(user.balance.abs() < f64::EPSILON);

        db.update_user_balance("u1", 42.5).unwrap();
        let user = db.get_user("u1").unwrap().unwrap();
        assert!((user.balance - 42.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_duplicate_user_insert_fails() {
        let db = CloudDatabase::open_in_memory().unwrap();
        db.insert_user("u1", 0.0).unwrap();
        assert!(db.insert_user("u1", 0.0).is_err());
    }

    #[test]
    fn test_update_balance_missing_user() {
        let db = CloudDatabase::open_in_memory().unwrap();
        assert!(db.update_user_balance("ghost", 1.0).is_err());
    }

    #[test]
    fn test_goal_roundtrip_keeps_every_field() {
        let db = CloudDatabase::open_in_memory().unwrap();
        db.insert_user("u1", 0.0).unwrap();

        let goal = db.insert_goal(&sample_goal("u1")).unwrap();
        assert_eq!(goal.user_id, "u1");
        assert_eq!(goal.name, "Trip");
        assert_eq!(goal.status, GoalStatus::Hidden);
        assert!(goal.is_primary);
        assert_eq!(goal.order_index, 3);
        assert_eq!(goal.icon, GoalIcon::default());
        assert_eq!(goal.deadline, NaiveDate::from_ymd_opt(2025, 1, 31));
        assert!((goal.current_amount - 200.0).abs() < f64::EPSILON);

        let listed = db.list_goals("u1").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, goal.id);
        assert!(db.list_goals("someone-else").unwrap().is_empty());
    }

    #[test]
    fn test_goal_requires_existing_user() {
        let db = CloudDatabase::open_in_memory().unwrap();
        assert!(db.insert_goal(&sample_goal("ghost")).is_err());
    }

    #[test]
    fn test_list_shifts_between_filters_by_date() {
        let db = CloudDatabase::open_in_memory().unwrap();
        db.insert_user("u1", 0.0).unwrap();
        for d in [10, 15, 20] {
            db.insert_shift(&sample_shift("u1", date(d))).unwrap();
        }

        let in_range = db.list_shifts_between("u1", date(12), date(20)).unwrap();
        let dates: Vec<NaiveDate> = in_range.iter().map(|s| s.scheduled_date).collect();
        assert_eq!(dates, vec![date(15), date(20)]);

        let shift = &in_range[0];
        assert_eq!(shift.shift_type, ShiftType::Night);
        assert_eq!(shift.operation_type, OperationType::Receiving);
        assert_eq!(shift.status, ShiftStatus::Completed);
        assert_eq!(shift.earnings, Some(180.0));
        assert_eq!(
            shift.scheduled_end.format(DATETIME_FORMAT).to_string(),
            "2024-06-16T08:00:00"
        );
        assert_eq!(db.list_shifts("u1").unwrap().len(), 3);
    }

    #[test]
    fn test_find_allocation_by_pair() {
        let db = CloudDatabase::open_in_memory().unwrap();
        db.insert_user("u1", 0.0).unwrap();
        let goal = db.insert_goal(&sample_goal("u1")).unwrap();
        let shift = db.insert_shift(&sample_shift("u1", date(15))).unwrap();

        assert!(db.find_allocation(&shift.id, &goal.id).unwrap().is_none());
        let created = db
            .insert_allocation(&NewCloudAllocation {
                shift_id: shift.id.clone(),
                goal_id: goal.id.clone(),
                amount: 45.0,
            })
            .unwrap();
        let found = db.find_allocation(&shift.id, &goal.id).unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!((found.amount - 45.0).abs() < f64::EPSILON);

        assert_eq!(db.list_allocations("u1").unwrap().len(), 1);
        assert!(db.list_allocations("u2").unwrap().is_empty());
    }

    #[test]
    fn test_allocation_rejects_unknown_goal() {
        let db = CloudDatabase::open_in_memory().unwrap();
        db.insert_user("u1", 0.0).unwrap();
        let shift = db.insert_shift(&sample_shift("u1", date(15))).unwrap();
        let result = db.insert_allocation(&NewCloudAllocation {
            shift_id: shift.id,
            goal_id: "missing".to_string(),
            amount: 10.0,
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sqlite_cloud_store_delegates() {
        let cloud = SqliteCloud::open_in_memory().unwrap();
        cloud.insert_user("u1", 5.0).await.unwrap();
        cloud.insert_goal(&sample_goal("u1")).await.unwrap();
        let user = cloud.get_user("u1").await.unwrap().unwrap();
        assert!((user.balance - 5.0).abs() < f64::EPSILON);
        assert_eq!(cloud.list_goals("u1").await.unwrap().len(), 1);
    }
}
