use anyhow::{Result, bail};
use serde::Serialize;

use shiftbank_core::migration::{GateOutcome, MigrationNotifier, MigrationSummary};
use shiftbank_core::models::{AuthEvent, GoalStatus};
use shiftbank_core::service::ShiftbankService;

use super::helpers::{money, print_goal_table, print_shift_table};

/// Shows migration notices on the terminal. With `--json` they go to
/// stderr so stdout stays machine readable.
struct TerminalNotifier {
    json: bool,
}

impl TerminalNotifier {
    fn say(&self, line: &str) {
        if self.json {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
}

impl MigrationNotifier for TerminalNotifier {
    fn migration_succeeded(&self, summary: &MigrationSummary) {
        self.say(&format!(
            "Your offline data is now in your account: {} goal(s) and {} shift(s) moved.",
            summary.migrated_goals, summary.migrated_shifts
        ));
    }

    fn migration_failed(&self, _message: &str) {
        self.say("Could not move your offline data right now. It is still on this device; try signing in again later.");
    }
}

pub(crate) async fn cmd_balance(svc: &ShiftbankService, json: bool) -> Result<()> {
    #[derive(Serialize)]
    struct BalanceReport {
        balance: f64,
        saved_in_goals: f64,
        active_goals: usize,
    }

    let balance = svc.balance().await?;
    let goals = svc.list_goals().await?;
    let report = BalanceReport {
        balance,
        saved_in_goals: goals.iter().map(|g| g.current_amount).sum(),
        active_goals: goals.iter().filter(|g| g.status == GoalStatus::Active).count(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Balance:        {}", money(report.balance));
        println!("Saved in goals: {}", money(report.saved_in_goals));
        println!("Active goals:   {}", report.active_goals);
    }
    Ok(())
}

pub(crate) async fn cmd_auth(
    svc: &ShiftbankService,
    event: AuthEvent,
    user_id: &str,
    json: bool,
) -> Result<()> {
    if user_id.trim().is_empty() {
        bail!("User id cannot be empty");
    }
    let notifier = TerminalNotifier { json };
    let outcome = svc.authenticate(event, user_id.trim(), &notifier).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        GateOutcome::AlreadyRunning => eprintln!("A migration is already running."),
        GateOutcome::Completed(result) => {
            if result.success && !result.migrated_anything() {
                println!("Signed in as {user_id}. Nothing to migrate.");
            } else if result.success {
                println!("Signed in as {user_id}.");
            }
            if !result.skipped.is_empty() {
                eprintln!("{} item(s) could not be migrated:", result.skipped.len());
                for skipped in &result.skipped {
                    eprintln!("  {} {}: {}", skipped.kind, skipped.local_id, skipped.reason);
                }
            }
            if !result.success {
                bail!("Migration did not complete");
            }
        }
    }
    Ok(())
}

pub(crate) async fn cmd_cloud_summary(
    svc: &ShiftbankService,
    user_id: &str,
    json: bool,
) -> Result<()> {
    let summary = svc.cloud_summary(user_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let Some(user) = &summary.user else {
        eprintln!("No cloud account for '{user_id}'");
        return Ok(());
    };
    println!("Account {} (balance {})", user.id, money(user.balance));
    if !summary.goals.is_empty() {
        print_goal_table(&summary.goals);
    }
    if !summary.shifts.is_empty() {
        print_shift_table(&summary.shifts);
    }
    println!("{} allocation(s)", summary.allocations.len());
    Ok(())
}
