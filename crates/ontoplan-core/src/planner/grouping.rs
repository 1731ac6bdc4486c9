//! Grouping of breaking changes by owning entity.

use crate::planner::strategy::RuleKind;
use indexmap::IndexMap;
use ontoplan_proto::{BreakingChange, DroppedChange, ResourceType};
use tracing::warn;

/// Changes grouped by owning entity, in first-appearance order.
///
/// Changes without an owner are kept apart in `unattributed`, so a real
/// entity named like the `Unknown` bucket keeps its own group.
#[derive(Debug, Clone, Default)]
pub struct GroupedChanges {
    pub groups: IndexMap<String, Vec<BreakingChange>>,
    pub unattributed: Vec<BreakingChange>,
    pub dropped: Vec<DroppedChange>,
}

impl GroupedChanges {
    /// Entities in first-appearance order.
    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Number of changes routed to the `Unknown` bucket.
    pub fn unattributed_count(&self) -> usize {
        self.unattributed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.unattributed.is_empty()
    }
}

/// Partition changes by owning entity.
///
/// Entity changes belong to `resource_name`; all others to
/// `metadata.object_type`, or the `Unknown` bucket when that is missing.
/// Malformed changes are dropped and reported.
pub fn group(changes: &[BreakingChange]) -> GroupedChanges {
    let mut grouped = GroupedChanges::default();

    for (index, change) in changes.iter().enumerate() {
        if let Some(reason) = malformed(change) {
            warn!(index, rule_id = %change.rule_id, reason, "Dropping malformed change");
            grouped.dropped.push(DroppedChange {
                index,
                rule_id: change.rule_id.clone(),
                reason: reason.to_string(),
            });
            continue;
        }

        let owner = match change.resource_type {
            ResourceType::Entity => Some(change.resource_name.trim()),
            _ => change
                .metadata_str("object_type")
                .map(str::trim)
                .filter(|s| !s.is_empty()),
        };
        match owner {
            Some(owner) => grouped
                .groups
                .entry(owner.to_string())
                .or_default()
                .push(change.clone()),
            None => grouped.unattributed.push(change.clone()),
        }
    }

    grouped
}

fn malformed(change: &BreakingChange) -> Option<&'static str> {
    if change.resource_name.trim().is_empty() {
        return Some("missing resource_name");
    }
    match RuleKind::parse(&change.rule_id) {
        Some(RuleKind::DataTypeChange) if change.field_name.is_none() => {
            Some("data type change without field_name")
        }
        Some(RuleKind::RequiredFieldRemoval) if change.field_names().is_empty() => {
            Some("required field removal names no field")
        }
        _ => None,
    }
}
