//! Change impact analysis.

use super::{column, record_failure, DependencyAnalyzer};
use futures::stream::{self, StreamExt};
use indexmap::IndexSet;
use ontoplan_proto::{
    Diagnostics, GraphQuery, ImpactKind, ImpactReport, Pattern, Recommendation, RelationPath,
    Severity, Term,
};
use tracing::{debug, info, instrument};

impl DependencyAnalyzer {
    /// Compute direct, transitive and critical dependents of `entity`.
    ///
    /// A failed lookup for one relation kind is skipped and the report is
    /// marked partial. Only the first `max_transitive_sources` direct
    /// dependents are expanded transitively.
    #[instrument(skip(self))]
    pub async fn analyze_change_impact(&self, entity: &str, change_kind: ImpactKind) -> ImpactReport {
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.impact(entity, change_kind)) {
            debug!("Impact report served from cache");
            return cached;
        }

        let deadline = self.deadline();
        let mut diagnostics = Diagnostics::default();

        let lookups: Vec<_> = stream::iter(self.config.relation_kinds.iter())
            .map(|relation| async move {
                let direct = self
                    .fetch(deadline, &self.dependents_query(entity, relation, false))
                    .await;
                let critical = self
                    .fetch(deadline, &self.dependents_query(entity, relation, true))
                    .await;
                (relation, direct, critical)
            })
            .buffered(self.concurrency())
            .collect()
            .await;

        let mut direct: IndexSet<String> = IndexSet::new();
        let mut critical: IndexSet<String> = IndexSet::new();
        for (relation, direct_rows, critical_rows) in lookups {
            match direct_rows {
                Ok(rows) => direct.extend(column(&rows, "dep", &mut diagnostics)),
                Err(e) => record_failure(&mut diagnostics, format!("dependents via {relation}"), e),
            }
            match critical_rows {
                Ok(rows) => critical.extend(column(&rows, "dep", &mut diagnostics)),
                Err(e) => record_failure(
                    &mut diagnostics,
                    format!("critical dependents via {relation}"),
                    e,
                ),
            }
        }
        direct.shift_remove(entity);
        critical.shift_remove(entity);

        let cap = self.config.max_transitive_sources;
        if direct.len() > cap {
            diagnostics.limit("max_transitive_sources", cap, direct.len());
        }

        let expansions: Vec<_> = stream::iter(direct.iter().take(cap))
            .map(|source| async move {
                (source, self.fetch(deadline, &self.transitive_query(source)).await)
            })
            .buffered(self.concurrency())
            .collect()
            .await;

        let mut transitive: IndexSet<String> = IndexSet::new();
        for (source, result) in expansions {
            match result {
                Ok(rows) => {
                    for node in column(&rows, "t", &mut diagnostics) {
                        if node != entity && !direct.contains(&node) {
                            transitive.insert(node);
                        }
                    }
                }
                Err(e) => record_failure(&mut diagnostics, format!("transitive dependents of {source}"), e),
            }
        }

        let total_affected = direct.len() + transitive.len();
        let threshold = self.config.large_impact_threshold;
        let report = ImpactReport {
            entity: entity.to_string(),
            change_kind,
            risk: assess_risk(change_kind, total_affected, critical.len(), threshold),
            recommendations: recommend(change_kind, direct.len(), critical.len(), total_affected, threshold),
            direct_dependents: direct.into_iter().collect(),
            transitive_dependents: transitive.into_iter().collect(),
            critical_dependents: critical.into_iter().collect(),
            total_affected,
            diagnostics,
        };

        info!(
            direct = report.direct_dependents.len(),
            transitive = report.transitive_dependents.len(),
            critical = report.critical_dependents.len(),
            risk = %report.risk,
            partial = report.diagnostics.partial,
            "Impact analysis complete"
        );

        if let Some(cache) = &self.cache {
            cache.store_impact(&report);
        }
        report
    }

    /// `?dep <relation> <entity>`, optionally restricted to critical dependents.
    fn dependents_query(&self, entity: &str, relation: &str, critical_only: bool) -> GraphQuery {
        let mut query = GraphQuery::select(["dep"]).distinct().with_pattern(Pattern::triple(
            Term::var("dep"),
            Term::node(relation),
            Term::node(entity),
        ));
        if critical_only {
            query = query.with_pattern(Pattern::triple(
                Term::var("dep"),
                Term::node(&self.config.impact_level_predicate),
                Term::literal(&self.config.critical_level),
            ));
        }
        query
    }

    /// Everything reaching `source` in one or more hops over any relation kind.
    fn transitive_query(&self, source: &str) -> GraphQuery {
        GraphQuery::select(["t"]).distinct().with_pattern(Pattern::path(
            Term::var("t"),
            RelationPath::bounded(self.config.relation_kinds.clone(), self.config.max_depth),
            Term::node(source),
        ))
    }
}

/// Risk of a change given its dependent counts.
pub fn assess_risk(
    change_kind: ImpactKind,
    total_affected: usize,
    critical: usize,
    large_impact_threshold: usize,
) -> Severity {
    if critical > 0 || (change_kind == ImpactKind::Deletion && total_affected > 0) {
        Severity::Critical
    } else if total_affected >= large_impact_threshold {
        Severity::High
    } else if total_affected > 0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Structured recommendations derived from counts and change kind only.
pub fn recommend(
    change_kind: ImpactKind,
    direct: usize,
    critical: usize,
    total_affected: usize,
    large_impact_threshold: usize,
) -> Vec<Recommendation> {
    if total_affected == 0 && critical == 0 {
        return vec![Recommendation::NoDependents];
    }

    let mut recommendations = Vec::new();
    if direct > 0 {
        recommendations.push(match change_kind {
            ImpactKind::Deletion => Recommendation::MigrateDependentsFirst { count: direct },
            ImpactKind::Modification => Recommendation::ValidateDependentCompatibility { count: direct },
            ImpactKind::Rename => Recommendation::UpdateReferences { count: direct },
        });
    }
    if critical > 0 {
        recommendations.push(Recommendation::NotifyCriticalOwners { count: critical });
    }
    if total_affected >= large_impact_threshold {
        recommendations.push(Recommendation::StagedRollout {
            affected: total_affected,
        });
    }
    recommendations
}
