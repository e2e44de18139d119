use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Goal,
    Shift,
    Allocation,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Goal => "goal",
            EntityKind::Shift => "shift",
            EntityKind::Allocation => "allocation",
        })
    }
}

/// Why a single entity was left behind. Never aborts the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    #[error("could not read existing cloud rows: {0}")]
    LookupFailed(String),
    #[error("cloud insert failed: {0}")]
    InsertFailed(String),
    #[error("goal {0} has no cloud counterpart")]
    UnresolvedGoal(String),
    #[error("shift {0} has no cloud counterpart")]
    UnresolvedShift(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntity {
    pub kind: EntityKind,
    pub local_id: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// What happened to one local entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityOutcome {
    /// A new cloud row was written; carries its id.
    Inserted(String),
    /// An existing cloud row already matched the natural key.
    Matched(String),
    Skipped(SkipReason),
}

/// Aggregated outcomes of one reconciler over its batch.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub kind: EntityKind,
    /// Local id to cloud id, for inserted and matched entities.
    pub mapping: HashMap<String, String>,
    pub inserted: usize,
    pub matched: usize,
    pub skipped: Vec<SkippedEntity>,
}

impl ReconcileReport {
    #[must_use]
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            mapping: HashMap::new(),
            inserted: 0,
            matched: 0,
            skipped: Vec::new(),
        }
    }

    pub fn record(&mut self, local_id: &str, outcome: EntityOutcome) {
        match outcome {
            EntityOutcome::Inserted(cloud_id) => {
                self.inserted += 1;
                self.mapping.insert(local_id.to_string(), cloud_id);
            }
            EntityOutcome::Matched(cloud_id) => {
                self.matched += 1;
                self.mapping.insert(local_id.to_string(), cloud_id);
            }
            EntityOutcome::Skipped(reason) => {
                tracing::warn!(kind = %self.kind, local_id, %reason, "skipping entity");
                self.skipped.push(SkippedEntity {
                    kind: self.kind,
                    local_id: local_id.to_string(),
                    reason,
                });
            }
        }
    }

    #[must_use]
    pub fn cloud_id(&self, local_id: &str) -> Option<&str> {
        self.mapping.get(local_id).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationResult {
    pub success: bool,
    pub migrated_goals: usize,
    pub migrated_shifts: usize,
    pub migrated_allocations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedEntity>,
}

impl MigrationResult {
    /// Nothing to migrate.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn migrated_anything(&self) -> bool {
        self.migrated_goals + self.migrated_shifts + self.migrated_allocations > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_and_maps() {
        let mut report = ReconcileReport::new(EntityKind::Goal);
        report.record("l1", EntityOutcome::Inserted("c1".to_string()));
        report.record("l2", EntityOutcome::Matched("c2".to_string()));
        report.record(
            "l3",
            EntityOutcome::Skipped(SkipReason::InsertFailed("boom".to_string())),
        );

        assert_eq!(report.inserted, 1);
        assert_eq!(report.matched, 1);
        assert_eq!(report.cloud_id("l1"), Some("c1"));
        assert_eq!(report.cloud_id("l2"), Some("c2"));
        assert_eq!(report.cloud_id("l3"), None);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].local_id, "l3");
    }

    #[test]
    fn test_result_serializes_skip_reason_inline() {
        let result = MigrationResult {
            success: true,
            skipped: vec![SkippedEntity {
                kind: EntityKind::Allocation,
                local_id: "a1".to_string(),
                reason: SkipReason::UnresolvedGoal("g1".to_string()),
            }],
            ..Default::default()
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["skipped"][0]["kind"], "allocation");
        assert_eq!(json["skipped"][0]["reason"], "unresolved_goal");
        assert_eq!(json["skipped"][0]["detail"], "g1");
        assert!(json.get("error").is_none());
    }
}
