mod account;
mod goal;
mod helpers;
mod shift;

pub(crate) use account::{cmd_auth, cmd_balance, cmd_cloud_summary};
pub(crate) use goal::{GoalArgs, cmd_goal_add, cmd_goal_list, cmd_goal_primary, cmd_goal_visibility};
pub(crate) use helpers::parse_date;
pub(crate) use shift::{cmd_shift_add, cmd_shift_earn, cmd_shift_list, cmd_shift_status};
