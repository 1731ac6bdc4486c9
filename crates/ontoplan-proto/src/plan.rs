//! The migration plan artifact.

use crate::analysis::SkippedBranch;
use crate::change::BreakingChange;
use crate::error::Error;
use crate::step::MigrationStep;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static PLAN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a unique plan ID as 32 hex characters.
pub fn generate_plan_id() -> String {
    let ts = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let seq = PLAN_SEQUENCE.fetch_add(1, Ordering::Relaxed);

    let mut hasher = blake3::Hasher::new();
    hasher.update(&ts.to_be_bytes());
    hasher.update(&seq.to_be_bytes());
    hasher.update(&std::process::id().to_be_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash.as_bytes()[..16])
}

/// Lifecycle state of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Scheduled,
    Executing,
    Completed,
    Failed,
    RolledBack,
}

impl PlanStatus {
    /// Whether a plan in this state may move to `to`.
    pub fn can_transition_to(self, to: PlanStatus) -> bool {
        use PlanStatus::*;
        matches!(
            (self, to),
            (Draft, Scheduled)
                | (Draft, Failed)
                | (Scheduled, Executing)
                | (Scheduled, Failed)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Executing, RolledBack)
                | (Failed, RolledBack)
        )
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Draft => write!(f, "draft"),
            PlanStatus::Scheduled => write!(f, "scheduled"),
            PlanStatus::Executing => write!(f, "executing"),
            PlanStatus::Completed => write!(f, "completed"),
            PlanStatus::Failed => write!(f, "failed"),
            PlanStatus::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// A contiguous run of downtime steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DowntimeWindow {
    /// Index of the first step in the window.
    pub start_step: usize,
    /// Index of the last step in the window (inclusive).
    pub end_step: usize,
    /// Total downtime in seconds.
    pub duration: u64,
    /// Descriptions of the steps in the window.
    pub steps: Vec<String>,
}

impl DowntimeWindow {
    /// Number of steps in the window.
    pub fn len(&self) -> usize {
        self.end_step - self.start_step + 1
    }

    /// Windows always hold at least one step.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether the step index falls inside the window.
    pub fn contains(&self, step_index: usize) -> bool {
        (self.start_step..=self.end_step).contains(&step_index)
    }
}

/// Entities left in a dependency cycle, appended to the execution order unsorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleDiagnostic {
    pub entities: Vec<String>,
}

/// A change whose `rule_id` has no registered strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownRule {
    pub entity: String,
    pub rule_id: String,
}

/// A change dropped before planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedChange {
    /// Position in the input list.
    pub index: usize,
    pub rule_id: String,
    pub reason: String,
}

/// Everything the planner could not do cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDiagnostics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<CycleDiagnostic>,
    pub unknown_rules: Vec<UnknownRule>,
    pub dropped_changes: Vec<DroppedChange>,
    /// Changes routed to the `Unknown` entity bucket.
    pub unattributed_changes: usize,
    /// Dependency queries failed; the order may miss edges.
    pub ordering_partial: bool,
    pub skipped: Vec<SkippedBranch>,
}

impl PlanDiagnostics {
    /// True when the plan was built without any warning.
    pub fn is_clean(&self) -> bool {
        self.cycle.is_none()
            && self.unknown_rules.is_empty()
            && self.dropped_changes.is_empty()
            && self.unattributed_changes == 0
            && !self.ordering_partial
    }
}

/// Computed contents of a plan, before it receives an identity.
#[derive(Debug, Clone)]
pub struct PlanParts {
    pub breaking_changes: Vec<BreakingChange>,
    pub target_branch: String,
    pub steps: Vec<MigrationStep>,
    pub rollback_steps: Vec<MigrationStep>,
    pub execution_order: Vec<String>,
    pub downtime_windows: Vec<DowntimeWindow>,
    pub status: PlanStatus,
    pub diagnostics: PlanDiagnostics,
}

/// An immutable migration plan.
///
/// Fields are read through accessors; a status change produces a new value
/// via [`MigrationPlan::transition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    id: String,
    breaking_changes: Vec<BreakingChange>,
    target_branch: String,
    steps: Vec<MigrationStep>,
    rollback_steps: Vec<MigrationStep>,
    execution_order: Vec<String>,
    estimated_duration_seconds: u64,
    requires_downtime: bool,
    downtime_windows: Vec<DowntimeWindow>,
    created_at: DateTime<Utc>,
    status: PlanStatus,
    diagnostics: PlanDiagnostics,
}

impl MigrationPlan {
    /// Assign an identity to computed plan contents and derive the totals.
    pub fn from_parts(parts: PlanParts) -> Self {
        let estimated_duration_seconds = parts
            .steps
            .iter()
            .map(|s| s.estimated_duration_seconds)
            .sum();
        let requires_downtime = parts.steps.iter().any(|s| s.requires_downtime);

        Self {
            id: generate_plan_id(),
            breaking_changes: parts.breaking_changes,
            target_branch: parts.target_branch,
            steps: parts.steps,
            rollback_steps: parts.rollback_steps,
            execution_order: parts.execution_order,
            estimated_duration_seconds,
            requires_downtime,
            downtime_windows: parts.downtime_windows,
            created_at: Utc::now(),
            status: parts.status,
            diagnostics: parts.diagnostics,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn breaking_changes(&self) -> &[BreakingChange] {
        &self.breaking_changes
    }

    pub fn target_branch(&self) -> &str {
        &self.target_branch
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    pub fn rollback_steps(&self) -> &[MigrationStep] {
        &self.rollback_steps
    }

    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    pub fn estimated_duration_seconds(&self) -> u64 {
        self.estimated_duration_seconds
    }

    pub fn requires_downtime(&self) -> bool {
        self.requires_downtime
    }

    pub fn downtime_windows(&self) -> &[DowntimeWindow] {
        &self.downtime_windows
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> PlanStatus {
        self.status
    }

    pub fn diagnostics(&self) -> &PlanDiagnostics {
        &self.diagnostics
    }

    /// Steps belonging to one entity, in plan order.
    pub fn steps_for_entity<'a>(&'a self, entity: &'a str) -> impl Iterator<Item = &'a MigrationStep> + 'a {
        self.steps.iter().filter(move |s| s.entity == entity)
    }

    /// Total downtime across all windows.
    pub fn total_downtime_seconds(&self) -> u64 {
        self.downtime_windows.iter().map(|w| w.duration).sum()
    }

    /// A copy of this plan in status `to`.
    pub fn transition(&self, to: PlanStatus) -> Result<MigrationPlan, Error> {
        if !self.status.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to,
            });
        }
        let mut next = self.clone();
        next.status = to;
        Ok(next)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{StepScript, StepType};

    fn parts(steps: Vec<MigrationStep>) -> PlanParts {
        PlanParts {
            breaking_changes: vec![],
            target_branch: "main".into(),
            steps,
            rollback_steps: vec![],
            execution_order: vec!["Order".into()],
            downtime_windows: vec![],
            status: PlanStatus::Draft,
            diagnostics: PlanDiagnostics::default(),
        }
    }

    fn step(duration: u64) -> MigrationStep {
        MigrationStep::new(
            StepType::VerifyDataIntegrity,
            "Order",
            "verify",
            StepScript::Verify {
                source: "Order".into(),
                target: "Order__migration_tmp".into(),
                checks: vec![],
            },
            duration,
        )
    }

    #[test]
    fn test_plan_ids_are_unique() {
        let a = generate_plan_id();
        let b = generate_plan_id();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_parts_derives_totals() {
        let plan = MigrationPlan::from_parts(parts(vec![step(5), step(7).with_downtime(7)]));
        assert_eq!(plan.estimated_duration_seconds(), 12);
        assert!(plan.requires_downtime());
        assert_eq!(plan.status(), PlanStatus::Draft);
    }

    #[test]
    fn test_transition_returns_new_plan() {
        let plan = MigrationPlan::from_parts(parts(vec![]));
        let scheduled = plan.transition(PlanStatus::Scheduled).unwrap();
        assert_eq!(plan.status(), PlanStatus::Draft);
        assert_eq!(scheduled.status(), PlanStatus::Scheduled);
        assert_eq!(scheduled.id(), plan.id());
    }

    #[test]
    fn test_invalid_transition() {
        let plan = MigrationPlan::from_parts(parts(vec![]));
        let err = plan.transition(PlanStatus::Completed).unwrap_err();
        assert!(err.to_string().contains("draft -> completed"));
    }

    #[test]
    fn test_json_roundtrip_preserves_plan() {
        let plan = MigrationPlan::from_parts(parts(vec![step(3)]));
        let restored = MigrationPlan::from_json(&plan.to_json().unwrap()).unwrap();
        assert_eq!(plan, restored);
    }

    #[test]
    fn test_window_contains() {
        let window = DowntimeWindow {
            start_step: 2,
            end_step: 3,
            duration: 40,
            steps: vec!["a".into(), "b".into()],
        };
        assert_eq!(window.len(), 2);
        assert!(window.contains(3));
        assert!(!window.contains(4));
    }
}
