use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use shiftbank_core::models::{DATE_FORMAT, Goal, Shift};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, DATE_FORMAT).with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Parse a money amount such as "120", "120.50" or "$120.50".
pub(crate) fn parse_amount(s: &str) -> Result<f64> {
    let trimmed = s.trim().trim_start_matches('$').replace(',', "");
    let value: f64 = trimmed
        .parse()
        .with_context(|| format!("Invalid amount: '{s}'. Use a number like '120.50'"))?;
    if !value.is_finite() || value <= 0.0 {
        bail!("Amount must be greater than 0");
    }
    Ok(value)
}

pub(crate) fn money(v: f64) -> String {
    format!("${:.2}", no_neg_zero(v))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

/// First eight characters of a uuid, enough to tell rows apart on screen.
pub(crate) fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Expand an id prefix typed by the user to the one full id it matches.
pub(crate) fn resolve_id<'a>(
    ids: impl IntoIterator<Item = &'a str>,
    prefix: &str,
    kind: &str,
) -> Result<String> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        bail!("Empty {kind} id");
    }
    let matches: Vec<&str> = ids.into_iter().filter(|id| id.starts_with(prefix)).collect();
    match matches.as_slice() {
        [id] => Ok((*id).to_string()),
        [] => bail!("No {kind} matches '{prefix}'"),
        _ => bail!("'{prefix}' matches {} {kind}s, use more characters", matches.len()),
    }
}

pub(crate) fn print_goal_table(goals: &[Goal]) {
    #[derive(Tabled)]
    struct GoalRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "")]
        primary: &'static str,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Saved")]
        saved: String,
        #[tabled(rename = "Target")]
        target: String,
        #[tabled(rename = "Progress")]
        progress: String,
        #[tabled(rename = "Alloc %")]
        allocation: String,
        #[tabled(rename = "Status")]
        status: String,
    }

    let rows: Vec<GoalRow> = goals
        .iter()
        .map(|g| GoalRow {
            id: short_id(&g.id),
            primary: if g.is_primary { "*" } else { "" },
            name: truncate(&g.name, 30),
            saved: money(g.current_amount),
            target: money(g.target_amount),
            progress: format!("{:.0}%", (g.current_amount / g.target_amount * 100.0).min(100.0)),
            allocation: format!("{:.0}", g.allocation_percentage),
            status: g.status.to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_shift_table(shifts: &[Shift]) {
    #[derive(Tabled)]
    struct ShiftRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Shift")]
        shift_type: String,
        #[tabled(rename = "Operation")]
        operation: String,
        #[tabled(rename = "Hours")]
        hours: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Earnings")]
        earnings: String,
    }

    let rows: Vec<ShiftRow> = shifts
        .iter()
        .map(|s| ShiftRow {
            id: short_id(&s.id),
            date: s.scheduled_date.format(DATE_FORMAT).to_string(),
            shift_type: s.shift_type.to_string(),
            operation: s.operation_type.to_string(),
            hours: format!(
                "{}-{}",
                s.scheduled_start.format("%H:%M"),
                s.scheduled_end.format("%H:%M")
            ),
            status: s.status.to_string(),
            earnings: s.earnings.map_or("-".into(), money),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(6..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}
