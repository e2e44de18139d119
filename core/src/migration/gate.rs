use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::{info, warn};

use super::MigrationEngine;
use super::report::MigrationResult;
use super::snapshot::read_snapshot;
use crate::models::{AuthEvent, MigrationSnapshot};

/// What the user is told after a run that moved data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub migrated_goals: usize,
    pub migrated_shifts: usize,
}

/// Receives the outcome of a triggered migration for display.
pub trait MigrationNotifier: Send + Sync {
    fn migration_succeeded(&self, summary: &MigrationSummary);
    fn migration_failed(&self, message: &str);
}

/// Notifier that only writes log events.
pub struct LogNotifier;

impl MigrationNotifier for LogNotifier {
    fn migration_succeeded(&self, summary: &MigrationSummary) {
        info!(
            migrated_goals = summary.migrated_goals,
            migrated_shifts = summary.migrated_shifts,
            "guest data moved to account"
        );
    }

    fn migration_failed(&self, message: &str) {
        warn!(message, "guest data migration failed, will retry on next sign-in");
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateOutcome {
    Completed(MigrationResult),
    /// Another run held the gate; this trigger did nothing.
    AlreadyRunning,
}

/// Lets at most one migration run at a time in this process.
///
/// Triggers that arrive while a run is in flight return
/// [`GateOutcome::AlreadyRunning`] immediately instead of queueing.
pub struct MigrationGate {
    engine: MigrationEngine,
    in_flight: tokio::sync::Mutex<()>,
    captured: Mutex<Option<MigrationSnapshot>>,
}

impl MigrationGate {
    pub fn new(engine: MigrationEngine) -> Self {
        Self {
            engine,
            in_flight: tokio::sync::Mutex::new(()),
            captured: Mutex::new(None),
        }
    }

    /// Snapshot the guest store now, before an auth call can race with it.
    /// The next run that gets through the gate consumes it, and is used
    /// only if that run has no explicit snapshot. Returns whether there was
    /// anything to capture.
    pub async fn capture_snapshot(&self) -> bool {
        let snapshot = read_snapshot(self.engine.local()).await;
        let present = snapshot.is_some();
        *self.captured.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
        present
    }

    pub async fn run(&self, user_id: &str, snapshot: Option<MigrationSnapshot>) -> GateOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            info!(user_id, "migration already in progress, ignoring trigger");
            // The in-flight run owns this device's guest data
            self.take_captured();
            return GateOutcome::AlreadyRunning;
        };
        let captured = self.take_captured();
        let snapshot = snapshot.or(captured);
        let result = self.engine.run(user_id, snapshot).await;
        // A capture taken while the run was in flight is stale now
        self.take_captured();
        GateOutcome::Completed(result)
    }

    /// Entry point for the auth provider: run the migration for the
    /// authenticated user and report the outcome to `notifier`.
    pub async fn on_auth_event(
        &self,
        event: AuthEvent,
        user_id: &str,
        snapshot: Option<MigrationSnapshot>,
        notifier: &dyn MigrationNotifier,
    ) -> GateOutcome {
        info!(user_id, %event, "auth event received");
        let outcome = self.run(user_id, snapshot).await;
        if let GateOutcome::Completed(result) = &outcome {
            if !result.success {
                notifier.migration_failed(
                    result.error.as_deref().unwrap_or("migration did not complete"),
                );
            } else if result.migrated_goals + result.migrated_shifts > 0 {
                notifier.migration_succeeded(&MigrationSummary {
                    migrated_goals: result.migrated_goals,
                    migrated_shifts: result.migrated_shifts,
                });
            }
        }
        outcome
    }

    fn take_captured(&self) -> Option<MigrationSnapshot> {
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
