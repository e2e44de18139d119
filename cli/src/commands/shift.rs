use anyhow::Result;

use shiftbank_core::models::{DATE_FORMAT, OperationType, ShiftStatus, ShiftType};
use shiftbank_core::service::ShiftbankService;

use super::helpers::{money, parse_amount, parse_date, print_shift_table, resolve_id};

pub(crate) async fn cmd_shift_add(
    svc: &ShiftbankService,
    date: Option<String>,
    shift_type: ShiftType,
    operation: OperationType,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let shift = svc
        .schedule_shift(&date.format(DATE_FORMAT).to_string(), shift_type, operation)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&shift)?);
    } else {
        println!(
            "Scheduled {} {} shift on {} ({} to {})",
            shift.shift_type,
            shift.operation_type,
            shift.scheduled_date.format(DATE_FORMAT),
            shift.scheduled_start.format("%H:%M"),
            shift.scheduled_end.format("%a %H:%M")
        );
    }
    Ok(())
}

pub(crate) async fn cmd_shift_list(svc: &ShiftbankService, json: bool) -> Result<()> {
    let shifts = svc.list_shifts().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&shifts)?);
    } else if shifts.is_empty() {
        eprintln!("No shifts yet. Use `shiftbank shift add` to schedule one.");
    } else {
        print_shift_table(&shifts);
    }
    Ok(())
}

pub(crate) async fn cmd_shift_status(
    svc: &ShiftbankService,
    id: &str,
    status: ShiftStatus,
    json: bool,
) -> Result<()> {
    let id = resolve_shift(svc, id).await?;
    let shift = svc.set_shift_status(&id, status).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&shift)?);
    } else {
        println!(
            "Shift on {} is now {}",
            shift.scheduled_date.format(DATE_FORMAT),
            shift.status
        );
    }
    Ok(())
}

pub(crate) async fn cmd_shift_earn(
    svc: &ShiftbankService,
    id: &str,
    amount: &str,
    json: bool,
) -> Result<()> {
    let id = resolve_shift(svc, id).await?;
    let amount = parse_amount(amount)?;
    let receipt = svc.record_earnings(&id, amount).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
        return Ok(());
    }

    println!(
        "Recorded {} for the shift on {}",
        money(amount),
        receipt.shift.scheduled_date.format(DATE_FORMAT)
    );
    let goals = svc.list_goals().await?;
    for allocation in &receipt.allocations {
        let name = goals
            .iter()
            .find(|g| g.id == allocation.goal_id)
            .map_or("?", |g| g.name.as_str());
        println!("  {} -> {name}", money(allocation.amount));
    }
    println!("  {} -> balance", money(receipt.to_balance));
    for goal_id in &receipt.completed_goals {
        if let Some(goal) = goals.iter().find(|g| &g.id == goal_id) {
            println!("Goal reached: {}!", goal.name);
        }
    }
    Ok(())
}

async fn resolve_shift(svc: &ShiftbankService, prefix: &str) -> Result<String> {
    let shifts = svc.list_shifts().await?;
    resolve_id(shifts.iter().map(|s| s.id.as_str()), prefix, "shift")
}
