//! Circular dependency detection.

use super::{record_failure, DependencyAnalyzer};
use futures::stream::{self, StreamExt};
use ontoplan_proto::{
    AnalysisOutcome, BindingValue, ConflictType, Diagnostics, GraphQuery, ImpactScope, Pattern,
    RelationPath, SemanticConflict, Severity, Term,
};
use std::collections::BTreeSet;
use tracing::{info, instrument};

impl DependencyAnalyzer {
    /// Find dependency cycles per relation kind.
    ///
    /// Cycles are identified by their sorted node set, so a cycle reachable
    /// through several relation kinds or start nodes is reported once.
    #[instrument(skip(self))]
    pub async fn detect_circular_dependencies(&self) -> AnalysisOutcome<Vec<SemanticConflict>> {
        let deadline = self.deadline();
        let mut diagnostics = Diagnostics::default();

        let searches: Vec<_> = stream::iter(self.config.relation_kinds.iter())
            .map(|relation| async move {
                (relation, self.fetch(deadline, &self.cycle_query(relation)).await)
            })
            .buffered(self.concurrency())
            .collect()
            .await;

        let mut seen: BTreeSet<Vec<String>> = BTreeSet::new();
        let mut conflicts: Vec<SemanticConflict> = Vec::new();
        for (relation, result) in searches {
            let rows = match result {
                Ok(rows) => rows,
                Err(e) => {
                    record_failure(&mut diagnostics, format!("cycles via {relation}"), e);
                    continue;
                }
            };
            for row in rows {
                let Some(path) = row.get("cycle").and_then(BindingValue::as_path) else {
                    diagnostics.parse_fallback(
                        "cycle",
                        row.get("cycle").map(BindingValue::raw).unwrap_or_default(),
                    );
                    continue;
                };
                let members = cycle_members(path);
                if members.is_empty() || !seen.insert(members.clone()) {
                    continue;
                }
                conflicts.push(cycle_conflict(relation, path, members));
            }
        }

        conflicts.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.affected_nodes.cmp(&b.affected_nodes))
        });

        info!(cycles = conflicts.len(), partial = diagnostics.partial, "Cycle detection complete");
        AnalysisOutcome::new(conflicts, diagnostics)
    }

    /// `?n <relation>{1,max_cycle_length} ?n`, binding the node sequence.
    fn cycle_query(&self, relation: &str) -> GraphQuery {
        GraphQuery::select(["n", "cycle"]).with_pattern(Pattern::path_bound(
            Term::var("n"),
            RelationPath::bounded(vec![relation.to_string()], self.config.max_cycle_length),
            Term::var("n"),
            "cycle",
        ))
    }
}

/// Severity of a cycle with `length` distinct members.
pub fn cycle_severity(length: usize) -> Severity {
    match length {
        0..=2 => Severity::Critical,
        3 => Severity::High,
        4..=5 => Severity::Medium,
        _ => Severity::Low,
    }
}

/// Sorted, deduplicated members of a closed path.
fn cycle_members(path: &[String]) -> Vec<String> {
    let open = match (path.first(), path.last()) {
        (Some(first), Some(last)) if path.len() > 1 && first == last => &path[..path.len() - 1],
        _ => path,
    };
    let members: BTreeSet<&String> = open.iter().collect();
    members.into_iter().cloned().collect()
}

fn cycle_conflict(relation: &str, path: &[String], members: Vec<String>) -> SemanticConflict {
    let length = members.len();
    SemanticConflict {
        conflict_type: ConflictType::CircularDependency,
        severity: cycle_severity(length),
        description: format!(
            "Circular '{}' dependency across {} entities: {}",
            relation,
            length,
            path.join(" -> ")
        ),
        suggested_resolution: format!(
            "Remove or invert one '{relation}' relation in the cycle, or extract the shared part into a separate entity"
        ),
        impact_scope: ImpactScope::for_node_count(length),
        affected_nodes: members,
    }
}
