use anyhow::Result;
use chrono::NaiveDate;

use shiftbank_core::models::{Goal, GoalIcon, GoalStatus, NewGoal};
use shiftbank_core::service::ShiftbankService;

use super::helpers::{money, parse_amount, print_goal_table, resolve_id};

pub(crate) struct GoalArgs {
    pub name: String,
    pub target: String,
    pub allocation: f64,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub background: Option<String>,
    pub deadline: Option<NaiveDate>,
}

pub(crate) async fn cmd_goal_add(svc: &ShiftbankService, args: GoalArgs, json: bool) -> Result<()> {
    let defaults = GoalIcon::default();
    let goal = svc
        .create_goal(&NewGoal {
            name: args.name,
            icon: GoalIcon {
                key: args.icon.unwrap_or(defaults.key),
                color: args.color.unwrap_or(defaults.color),
                background: args.background.unwrap_or(defaults.background),
            },
            target_amount: parse_amount(&args.target)?,
            allocation_percentage: args.allocation,
            deadline: args.deadline,
        })
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&goal)?);
    } else {
        println!(
            "Created goal '{}' ({} target, {:.0}% of each shift)",
            goal.name,
            money(goal.target_amount),
            goal.allocation_percentage
        );
        if goal.is_primary {
            println!("  This is your primary goal.");
        }
    }
    Ok(())
}

pub(crate) async fn cmd_goal_list(svc: &ShiftbankService, all: bool, json: bool) -> Result<()> {
    let goals: Vec<Goal> = svc
        .list_goals()
        .await?
        .into_iter()
        .filter(|g| all || g.status != GoalStatus::Hidden)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&goals)?);
    } else if goals.is_empty() {
        eprintln!("No goals yet. Use `shiftbank goal add` to create one.");
    } else {
        print_goal_table(&goals);
    }
    Ok(())
}

pub(crate) async fn cmd_goal_primary(svc: &ShiftbankService, id: &str, json: bool) -> Result<()> {
    let id = resolve_goal(svc, id).await?;
    let goal = svc.set_primary_goal(&id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&goal)?);
    } else {
        println!("'{}' is now your primary goal", goal.name);
    }
    Ok(())
}

pub(crate) async fn cmd_goal_visibility(
    svc: &ShiftbankService,
    id: &str,
    hidden: bool,
    json: bool,
) -> Result<()> {
    let id = resolve_goal(svc, id).await?;
    let goal = if hidden {
        svc.hide_goal(&id).await?
    } else {
        svc.show_goal(&id).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&goal)?);
    } else if hidden {
        println!("Hid goal '{}'", goal.name);
    } else {
        println!("Goal '{}' is visible again", goal.name);
    }
    Ok(())
}

async fn resolve_goal(svc: &ShiftbankService, prefix: &str) -> Result<String> {
    let goals = svc.list_goals().await?;
    resolve_id(goals.iter().map(|g| g.id.as_str()), prefix, "goal")
}
