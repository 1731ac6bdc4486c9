//! Orphaned entities and dangling references.

use super::{column, record_failure, BranchError, DependencyAnalyzer};
use crate::port::Deadline;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use ontoplan_proto::{
    AnalysisOutcome, BindingValue, ConflictType, Diagnostics, GraphQuery, ImpactScope, Pattern,
    QueryFilter, RelationPath, SemanticConflict, Severity, Term,
};
use tracing::{info, instrument};

impl DependencyAnalyzer {
    /// Find entities with no incoming or outgoing dependency edge.
    ///
    /// Scans the first `orphan_scan_limit` entities by id, skipping the
    /// system namespace. Orphans are reported as a single conflict. An
    /// entity whose probe fails is not counted.
    #[instrument(skip(self))]
    pub async fn analyze_orphaned_entities(&self) -> AnalysisOutcome<Vec<SemanticConflict>> {
        let deadline = self.deadline();
        let mut diagnostics = Diagnostics::default();
        let cap = self.config.orphan_scan_limit;

        let mut entities = match self.fetch(deadline, &self.entity_listing(cap)).await {
            Ok(rows) => column(&rows, "e", &mut diagnostics),
            Err(e) => {
                record_failure(&mut diagnostics, "entity listing".to_string(), e);
                return AnalysisOutcome::new(Vec::new(), diagnostics);
            }
        };
        if entities.len() > cap {
            diagnostics.limit("orphan_scan_limit", cap, entities.len());
            entities.truncate(cap);
        }

        let probes: Vec<_> = stream::iter(entities.iter())
            .map(|entity| async move { (entity, self.has_edges(deadline, entity).await) })
            .buffered(self.concurrency())
            .collect()
            .await;

        let mut orphans = Vec::new();
        for (entity, result) in probes {
            match result {
                Ok(true) => {}
                Ok(false) => orphans.push(entity.clone()),
                Err(e) => record_failure(&mut diagnostics, format!("orphan probe {entity}"), e),
            }
        }

        info!(
            scanned = entities.len(),
            orphans = orphans.len(),
            partial = diagnostics.partial,
            "Orphan scan complete"
        );

        if orphans.is_empty() {
            return AnalysisOutcome::new(Vec::new(), diagnostics);
        }
        let conflict = SemanticConflict {
            conflict_type: ConflictType::OrphanedNode,
            severity: Severity::Low,
            description: format!(
                "{} entities have no dependency relations: {}",
                orphans.len(),
                orphans.join(", ")
            ),
            suggested_resolution:
                "Link the entities to the ontology or remove them if they are unused".to_string(),
            impact_scope: ImpactScope::for_node_count(orphans.len()),
            affected_nodes: orphans,
        };
        AnalysisOutcome::new(vec![conflict], diagnostics)
    }

    /// Find dependency edges whose target is not a declared entity.
    ///
    /// One conflict per missing target, listing the entities that point at it.
    #[instrument(skip(self))]
    pub async fn detect_dangling_references(&self) -> AnalysisOutcome<Vec<SemanticConflict>> {
        let deadline = self.deadline();
        let mut diagnostics = Diagnostics::default();

        let query = GraphQuery::select(["s", "t"])
            .distinct()
            .with_pattern(Pattern::path(
                Term::var("s"),
                RelationPath::single_hop(self.config.relation_kinds.clone()),
                Term::var("t"),
            ))
            .with_filter(QueryFilter::NotExists {
                patterns: vec![self.entity_pattern("t")],
            });

        let rows = match self.fetch(deadline, &query).await {
            Ok(rows) => rows,
            Err(e) => {
                record_failure(&mut diagnostics, "dangling references".to_string(), e);
                return AnalysisOutcome::new(Vec::new(), diagnostics);
            }
        };

        let mut missing: IndexMap<String, Vec<String>> = IndexMap::new();
        for row in &rows {
            let source = row.get("s").and_then(BindingValue::as_str);
            let target = row.get("t").and_then(BindingValue::as_str);
            match (source, target) {
                (Some(source), Some(target)) => {
                    let sources = missing.entry(target.to_string()).or_default();
                    if !sources.iter().any(|s| s == source) {
                        sources.push(source.to_string());
                    }
                }
                _ => diagnostics.parse_fallback("t", "<unbound>"),
            }
        }

        let conflicts: Vec<SemanticConflict> = missing
            .into_iter()
            .map(|(target, sources)| {
                let mut affected = vec![target.clone()];
                affected.extend(sources.iter().cloned());
                SemanticConflict {
                    conflict_type: ConflictType::DanglingReference,
                    severity: Severity::High,
                    description: format!(
                        "'{}' is referenced by {} but is not a declared entity",
                        target,
                        sources.join(", ")
                    ),
                    suggested_resolution: format!(
                        "Declare '{target}' or remove the relations pointing at it"
                    ),
                    impact_scope: ImpactScope::for_node_count(affected.len()),
                    affected_nodes: affected,
                }
            })
            .collect();

        info!(dangling = conflicts.len(), partial = diagnostics.partial, "Dangling reference scan complete");
        AnalysisOutcome::new(conflicts, diagnostics)
    }

    /// Entities ordered by id outside the system namespace, one past the cap.
    fn entity_listing(&self, cap: usize) -> GraphQuery {
        GraphQuery::select(["e"])
            .distinct()
            .with_pattern(self.entity_pattern("e"))
            .with_filter(QueryFilter::NotPrefix {
                var: "e".into(),
                prefix: self.config.system_namespace.clone(),
            })
            .order_by("e")
            .limit(cap.saturating_add(1))
    }

    /// Whether `entity` has any outgoing or incoming dependency edge.
    async fn has_edges(&self, deadline: Deadline, entity: &str) -> Result<bool, BranchError> {
        let hop = RelationPath::single_hop(self.config.relation_kinds.clone());
        let outgoing = GraphQuery::select(["x"])
            .with_pattern(Pattern::path(Term::node(entity), hop.clone(), Term::var("x")))
            .limit(1);
        if !self.fetch(deadline, &outgoing).await?.is_empty() {
            return Ok(true);
        }

        let incoming = GraphQuery::select(["x"])
            .with_pattern(Pattern::path(Term::var("x"), hop, Term::node(entity)))
            .limit(1);
        Ok(!self.fetch(deadline, &incoming).await?.is_empty())
    }
}
