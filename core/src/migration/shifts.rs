use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::info;

use super::report::{EntityKind, EntityOutcome, ReconcileReport, SkipReason};
use crate::models::{NewCloudShift, OperationType, Shift, ShiftType};
use crate::store::CloudStore;

/// A user works at most one shift per date, shift type and operation.
type ShiftKey = (NaiveDate, ShiftType, OperationType);

fn shift_key(shift: &Shift) -> ShiftKey {
    (shift.scheduled_date, shift.shift_type, shift.operation_type)
}

/// Migrate local shifts, reusing cloud shifts with the same natural key.
///
/// Only the cloud rows inside the local batch's date range are read.
pub async fn migrate_shifts(
    cloud: &dyn CloudStore,
    user_id: &str,
    local_shifts: &[Shift],
) -> ReconcileReport {
    let mut report = ReconcileReport::new(EntityKind::Shift);
    let Some((from, to)) = date_range(local_shifts) else {
        return report;
    };

    let mut existing: HashMap<ShiftKey, String> =
        match cloud.list_shifts_between(user_id, from, to).await {
            Ok(shifts) => shifts.into_iter().map(|s| (shift_key(&s), s.id)).collect(),
            Err(e) => {
                let reason = SkipReason::LookupFailed(format!("{e:#}"));
                for shift in local_shifts {
                    report.record(&shift.id, EntityOutcome::Skipped(reason.clone()));
                }
                return report;
            }
        };

    for shift in local_shifts {
        let key = shift_key(shift);
        let outcome = if let Some(cloud_id) = existing.get(&key) {
            EntityOutcome::Matched(cloud_id.clone())
        } else {
            match cloud.insert_shift(&NewCloudShift::from_local(user_id, shift)).await {
                Ok(created) => {
                    existing.insert(key, created.id.clone());
                    EntityOutcome::Inserted(created.id)
                }
                Err(e) => EntityOutcome::Skipped(SkipReason::InsertFailed(format!("{e:#}"))),
            }
        };
        report.record(&shift.id, outcome);
    }

    info!(
        user_id,
        %from,
        %to,
        inserted = report.inserted,
        matched = report.matched,
        skipped = report.skipped.len(),
        "shifts reconciled"
    );
    report
}

fn date_range(shifts: &[Shift]) -> Option<(NaiveDate, NaiveDate)> {
    let from = shifts.iter().map(|s| s.scheduled_date).min()?;
    let to = shifts.iter().map(|s| s.scheduled_date).max()?;
    Some((from, to))
}
