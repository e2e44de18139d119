use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Fixed id of the single guest-mode user in the local store.
pub const LOCAL_USER_ID: &str = "local-user";

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} '{}'", self.kind, self.value)
    }
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl std::error::Error for ParseEnumError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Active,
    Completed,
    Hidden,
}

impl GoalStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Hidden => "hidden",
        }
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GoalStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "hidden" => Ok(Self::Hidden),
            _ => Err(ParseEnumError::new("goal status", s)),
        }
    }
}

/// Warehouse operation a shift is booked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Returns,
    Receiving,
}

impl OperationType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Returns => "returns",
            Self::Receiving => "receiving",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "returns" => Ok(Self::Returns),
            "receiving" => Ok(Self::Receiving),
            _ => Err(ParseEnumError::new("operation type", s)),
        }
    }
}

/// Day shifts run 08:00-20:00, night shifts 20:00-08:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftType {
    Day,
    Night,
}

impl ShiftType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Night => "night",
        }
    }
}

impl fmt::Display for ShiftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShiftType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "night" => Ok(Self::Night),
            _ => Err(ParseEnumError::new("shift type", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Scheduled,
    InProgress,
    Completed,
    Canceled,
    NoShow,
}

impl ShiftStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::NoShow => "no_show",
        }
    }
}

impl fmt::Display for ShiftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShiftStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "canceled" => Ok(Self::Canceled),
            "no_show" => Ok(Self::NoShow),
            _ => Err(ParseEnumError::new("shift status", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub balance: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalIcon {
    pub key: String,
    pub color: String,
    pub background: String,
}

impl Default for GoalIcon {
    fn default() -> Self {
        Self {
            key: "piggy-bank".to_string(),
            color: "#FFFFFF".to_string(),
            background: "#4CAF50".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub icon: GoalIcon,
    pub target_amount: f64,
    #[serde(default)]
    pub current_amount: f64,
    pub status: GoalStatus,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub order_index: i64,
    #[serde(default)]
    pub allocation_percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shift {
    pub id: String,
    pub user_id: String,
    pub operation_type: OperationType,
    pub shift_type: ShiftType,
    pub scheduled_date: NaiveDate,
    pub scheduled_start: NaiveDateTime,
    pub scheduled_end: NaiveDateTime,
    pub status: ShiftStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earnings: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earnings_recorded_at: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalAllocation {
    pub id: String,
    pub shift_id: String,
    pub goal_id: String,
    pub amount: f64,
    pub created_at: String,
}

/// Auth provider events that can trigger a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEvent {
    SignIn,
    SignUp,
    SessionRestore,
    AuthStateChange,
}

impl AuthEvent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SignIn => "sign_in",
            Self::SignUp => "sign_up",
            Self::SessionRestore => "session_restore",
            Self::AuthStateChange => "auth_state_change",
        }
    }
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthEvent {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sign_in" => Ok(Self::SignIn),
            "sign_up" => Ok(Self::SignUp),
            "session_restore" => Ok(Self::SessionRestore),
            "auth_state_change" => Ok(Self::AuthStateChange),
            _ => Err(ParseEnumError::new("auth event", s)),
        }
    }
}

// --- Guest-mode inputs ---

#[derive(Debug, Clone)]
pub struct NewGoal {
    pub name: String,
    pub icon: GoalIcon,
    pub target_amount: f64,
    pub allocation_percentage: f64,
    pub deadline: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct NewShift {
    pub operation_type: OperationType,
    pub shift_type: ShiftType,
    pub scheduled_date: NaiveDate,
}

/// What recording a shift's earnings did to the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct EarningsReceipt {
    pub shift: Shift,
    pub allocations: Vec<GoalAllocation>,
    pub to_balance: f64,
    pub completed_goals: Vec<String>,
}

// --- Cloud insert payloads ---

#[derive(Debug, Clone)]
pub struct NewCloudGoal {
    pub user_id: String,
    pub name: String,
    pub icon: GoalIcon,
    pub target_amount: f64,
    pub current_amount: f64,
    pub status: GoalStatus,
    pub is_primary: bool,
    pub order_index: i64,
    pub allocation_percentage: f64,
    pub deadline: Option<NaiveDate>,
    pub completed_at: Option<String>,
}

impl NewCloudGoal {
    /// Copy a local goal into a cloud insert owned by `user_id`.
    #[must_use]
    pub fn from_local(user_id: &str, goal: &Goal) -> Self {
        Self {
            user_id: user_id.to_string(),
            name: goal.name.clone(),
            icon: goal.icon.clone(),
            target_amount: goal.target_amount,
            current_amount: goal.current_amount,
            status: goal.status,
            is_primary: goal.is_primary,
            order_index: goal.order_index,
            allocation_percentage: goal.allocation_percentage,
            deadline: goal.deadline,
            completed_at: goal.completed_at.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewCloudShift {
    pub user_id: String,
    pub operation_type: OperationType,
    pub shift_type: ShiftType,
    pub scheduled_date: NaiveDate,
    pub scheduled_start: NaiveDateTime,
    pub scheduled_end: NaiveDateTime,
    pub status: ShiftStatus,
    pub earnings: Option<f64>,
    pub earnings_recorded_at: Option<String>,
}

impl NewCloudShift {
    #[must_use]
    pub fn from_local(user_id: &str, shift: &Shift) -> Self {
        Self {
            user_id: user_id.to_string(),
            operation_type: shift.operation_type,
            shift_type: shift.shift_type,
            scheduled_date: shift.scheduled_date,
            scheduled_start: shift.scheduled_start,
            scheduled_end: shift.scheduled_end,
            status: shift.status,
            earnings: shift.earnings,
            earnings_recorded_at: shift.earnings_recorded_at.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewCloudAllocation {
    pub shift_id: String,
    pub goal_id: String,
    pub amount: f64,
}

/// Everything the cloud holds for one user.
#[derive(Debug, Clone, Serialize)]
pub struct CloudSummary {
    pub user: Option<User>,
    pub goals: Vec<Goal>,
    pub shifts: Vec<Shift>,
    pub allocations: Vec<GoalAllocation>,
}

// --- Migration snapshot ---

/// Point-in-time copy of the guest-mode store, taken once per migration attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationSnapshot {
    pub balance: f64,
    pub goals: Vec<Goal>,
    pub shifts: Vec<Shift>,
    pub allocations: Vec<GoalAllocation>,
}

impl MigrationSnapshot {
    /// A snapshot counts only if it holds a goal, a shift, or a positive balance.
    #[must_use]
    pub fn is_present(&self) -> bool {
        !self.goals.is_empty() || !self.shifts.is_empty() || self.balance > 0.0
    }
}

// --- Scheduling ---

const DAY_SHIFT_START_HOUR: u32 = 8;
const NIGHT_SHIFT_START_HOUR: u32 = 20;
const SHIFT_LENGTH_HOURS: i64 = 12;

/// Start and end of a shift on `date`: day runs 08:00-20:00, night runs
/// 20:00 until 08:00 the following day.
#[must_use]
pub fn shift_window(date: NaiveDate, shift_type: ShiftType) -> (NaiveDateTime, NaiveDateTime) {
    let hour = match shift_type {
        ShiftType::Day => DAY_SHIFT_START_HOUR,
        ShiftType::Night => NIGHT_SHIFT_START_HOUR,
    };
    let start = date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default());
    (start, start + Duration::hours(SHIFT_LENGTH_HOURS))
}

/// Round a money amount to whole cents.
#[must_use]
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

// --- Validation ---

pub fn validate_new_goal(goal: &NewGoal) -> Result<()> {
    if goal.name.trim().is_empty() {
        bail!("Goal name must not be empty");
    }
    if goal.target_amount <= 0.0 {
        bail!("Goal target amount must be greater than 0");
    }
    if !(0.0..=100.0).contains(&goal.allocation_percentage) {
        bail!("Allocation percentage must be between 0 and 100");
    }
    Ok(())
}

/// Active goals may not route more than 100% of earnings between them.
pub fn validate_allocation_total(goals: &[Goal]) -> Result<()> {
    let total: f64 = goals
        .iter()
        .filter(|g| g.status == GoalStatus::Active)
        .map(|g| g.allocation_percentage)
        .sum();
    if total > 100.0 + f64::EPSILON {
        bail!("Active goals allocate {total}% of earnings, which exceeds 100%");
    }
    Ok(())
}

pub fn validate_earnings(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount < 0.0 {
        bail!("Earnings must be a non-negative amount");
    }
    Ok(())
}
