//! Integration tests for the dependency analyzer.

use async_trait::async_trait;
use ontoplan_core::{
    AnalysisCache, AnalyzerConfig, DependencyAnalyzer, GraphQueryPort, MemoryGraph, QueryError,
    RetryConfig,
};
use ontoplan_proto::{
    Binding, BindingValue, ConflictType, GraphQuery, ImpactKind, Pattern, Recommendation, Severity,
    Term,
};
use std::sync::Arc;
use std::time::Duration;

/// Customer <- Order <- Invoice <- Payment <- Report, Order <- Shipment.
/// Invoice is critical; Audit is unconnected; system:Meta is internal.
fn commerce_graph() -> MemoryGraph {
    let mut graph = MemoryGraph::new();
    for entity in [
        "Customer",
        "Order",
        "Invoice",
        "Payment",
        "Shipment",
        "Report",
        "Audit",
        "system:Meta",
    ] {
        graph.add_entity(entity);
    }
    graph
        .add_edge("Order", "link", "Customer")
        .add_edge("Invoice", "link", "Order")
        .add_edge("Payment", "link", "Invoice")
        .add_edge("Shipment", "link", "Order")
        .add_edge("Report", "link", "Payment")
        .set_impact_level("Invoice", "critical");
    graph
}

fn analyzer(graph: MemoryGraph) -> DependencyAnalyzer {
    DependencyAnalyzer::new(Arc::new(graph), AnalyzerConfig::default())
}

/// Rejects triple patterns over one predicate.
struct RejectingPort {
    inner: MemoryGraph,
    predicate: &'static str,
}

#[async_trait]
impl GraphQueryPort for RejectingPort {
    async fn query(&self, query: &GraphQuery) -> Result<Vec<Binding>, QueryError> {
        let hits_predicate = query.patterns.iter().any(|p| {
            matches!(p, Pattern::Triple { predicate: Term::Node(n), .. } if n == self.predicate)
        });
        if hits_predicate {
            return Err(QueryError::Rejected(format!("{} is not indexed", self.predicate)));
        }
        self.inner.evaluate(query)
    }
}

/// Replaces the count bound for one node with garbage.
struct GarbledCountPort {
    inner: MemoryGraph,
    node: &'static str,
}

#[async_trait]
impl GraphQueryPort for GarbledCountPort {
    async fn query(&self, query: &GraphQuery) -> Result<Vec<Binding>, QueryError> {
        let mut rows = self.inner.evaluate(query)?;
        if let Some(aggregate) = &query.aggregate {
            for row in &mut rows {
                let is_node = row.get(&aggregate.group_var).and_then(BindingValue::as_str) == Some(self.node);
                if is_node {
                    row.insert(aggregate.count_var.clone(), BindingValue::Literal("n/a".into()));
                }
            }
        }
        Ok(rows)
    }
}

/// Reports the same count for every grouped node.
struct FixedCountPort {
    inner: MemoryGraph,
    count: String,
}

#[async_trait]
impl GraphQueryPort for FixedCountPort {
    async fn query(&self, query: &GraphQuery) -> Result<Vec<Binding>, QueryError> {
        let mut rows = self.inner.evaluate(query)?;
        if let Some(aggregate) = &query.aggregate {
            for row in &mut rows {
                row.insert(aggregate.count_var.clone(), BindingValue::Literal(self.count.clone()));
            }
        }
        Ok(rows)
    }
}

/// Answers every query after a delay.
struct SlowPort {
    inner: MemoryGraph,
    delay: Duration,
}

#[async_trait]
impl GraphQueryPort for SlowPort {
    async fn query(&self, query: &GraphQuery) -> Result<Vec<Binding>, QueryError> {
        tokio::time::sleep(self.delay).await;
        self.inner.evaluate(query)
    }
}

#[tokio::test]
async fn test_deletion_impact() {
    let report = analyzer(commerce_graph())
        .analyze_change_impact("Order", ImpactKind::Deletion)
        .await;

    assert_eq!(report.direct_dependents, vec!["Invoice", "Shipment"]);
    let mut transitive = report.transitive_dependents.clone();
    transitive.sort();
    assert_eq!(transitive, vec!["Payment", "Report"]);
    assert_eq!(report.critical_dependents, vec!["Invoice"]);
    assert_eq!(report.total_affected, 4);
    assert_eq!(report.risk, Severity::Critical);
    assert_eq!(
        report.recommendations,
        vec![
            Recommendation::MigrateDependentsFirst { count: 2 },
            Recommendation::NotifyCriticalOwners { count: 1 },
        ]
    );
    assert!(report.diagnostics.is_clean());
}

#[tokio::test]
async fn test_leaf_entity_has_no_dependents() {
    let report = analyzer(commerce_graph())
        .analyze_change_impact("Report", ImpactKind::Modification)
        .await;

    assert!(report.direct_dependents.is_empty());
    assert_eq!(report.total_affected, 0);
    assert_eq!(report.risk, Severity::Low);
    assert_eq!(report.recommendations, vec![Recommendation::NoDependents]);
}

#[tokio::test]
async fn test_transitive_source_cap_is_reported() {
    let config = AnalyzerConfig::default().with_max_transitive_sources(1);
    let analyzer = DependencyAnalyzer::new(Arc::new(commerce_graph()), config);
    let report = analyzer.analyze_change_impact("Order", ImpactKind::Rename).await;

    // Only Invoice is expanded; Shipment has no dependents anyway.
    assert_eq!(report.direct_dependents.len(), 2);
    assert_eq!(report.diagnostics.limits_applied.len(), 1);
    assert_eq!(report.diagnostics.limits_applied[0].limit, "max_transitive_sources");
    assert_eq!(report.diagnostics.limits_applied[0].observed, 2);
    assert!(!report.diagnostics.partial);
}

#[tokio::test]
async fn test_failed_relation_marks_report_partial() {
    let mut graph = commerce_graph();
    graph.add_edge("Refund", "interface-extends", "Order");
    let port = RejectingPort {
        inner: graph,
        predicate: "interface-extends",
    };
    let config = AnalyzerConfig::default().with_retry(RetryConfig::no_retry());
    let report = DependencyAnalyzer::new(Arc::new(port), config)
        .analyze_change_impact("Order", ImpactKind::Modification)
        .await;

    assert_eq!(report.direct_dependents, vec!["Invoice", "Shipment"]);
    assert!(report.diagnostics.partial);
    assert!(!report.diagnostics.truncated);
    assert!(report
        .diagnostics
        .skipped
        .iter()
        .any(|s| s.branch == "dependents via interface-extends"));
}

#[tokio::test]
async fn test_deadline_truncates_analysis() {
    let port = SlowPort {
        inner: commerce_graph(),
        delay: Duration::from_millis(200),
    };
    let config = AnalyzerConfig::default().with_analysis_timeout(Duration::from_millis(30));
    let report = DependencyAnalyzer::new(Arc::new(port), config)
        .analyze_change_impact("Order", ImpactKind::Deletion)
        .await;

    assert!(report.diagnostics.truncated);
    assert!(report.diagnostics.partial);
    assert!(report.direct_dependents.is_empty());
}

#[tokio::test]
async fn test_cache_serves_repeat_calls() {
    let graph = Arc::new(commerce_graph());
    let cache = Arc::new(AnalysisCache::new());
    let analyzer = DependencyAnalyzer::new(graph.clone(), AnalyzerConfig::default()).with_cache(cache.clone());

    let first = analyzer.analyze_change_impact("Order", ImpactKind::Deletion).await;
    let queries = graph.query_count();
    let second = analyzer.analyze_change_impact("Order", ImpactKind::Deletion).await;

    assert_eq!(first, second);
    assert_eq!(graph.query_count(), queries);
    assert_eq!(cache.stats().hits(), 1);
}

#[tokio::test]
async fn test_cycle_found_via_two_relations_reported_once() {
    let mut graph = commerce_graph();
    graph
        .add_edge("A", "link", "B")
        .add_edge("B", "link", "A")
        .add_edge("A", "interface-extends", "B")
        .add_edge("B", "interface-extends", "A")
        .add_edge("C", "link", "D")
        .add_edge("D", "link", "E")
        .add_edge("E", "link", "C");

    let outcome = analyzer(graph).detect_circular_dependencies().await;
    let cycles = outcome.value;

    assert_eq!(cycles.len(), 2);
    assert!(cycles.iter().all(|c| c.conflict_type == ConflictType::CircularDependency));
    assert_eq!(cycles[0].affected_nodes, vec!["A", "B"]);
    assert_eq!(cycles[0].severity, Severity::Critical);
    assert_eq!(cycles[1].affected_nodes, vec!["C", "D", "E"]);
    assert_eq!(cycles[1].severity, Severity::High);
    assert!(outcome.diagnostics.is_clean());
}

#[tokio::test]
async fn test_acyclic_graph_has_no_cycles() {
    let outcome = analyzer(commerce_graph()).detect_circular_dependencies().await;
    assert!(outcome.value.is_empty());
}

#[tokio::test]
async fn test_critical_paths_ranked_by_score() {
    let outcome = analyzer(commerce_graph()).find_critical_paths(2).await;
    let paths = outcome.value;

    assert_eq!(paths.len(), 2);
    assert_eq!(paths[0].nodes, vec!["Invoice", "Order"]);
    assert!((paths[0].total_weight - 5.0).abs() < 1e-9);
    assert!(paths[0].is_critical);
    assert_eq!(paths[1].nodes, vec!["Payment", "Invoice"]);
    assert!((paths[1].total_weight - 4.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_unparseable_degree_defaults_to_zero() {
    let port = GarbledCountPort {
        inner: commerce_graph(),
        node: "Order",
    };
    let outcome = DependencyAnalyzer::new(Arc::new(port), AnalyzerConfig::default())
        .find_critical_paths(10)
        .await;

    assert!(!outcome.diagnostics.parse_fallbacks.is_empty());
    assert!(outcome.diagnostics.parse_fallbacks.iter().all(|f| f.raw == "n/a"));
    // Order drops out of the hub pool; only Payment -> Invoice remains.
    assert_eq!(outcome.value.len(), 1);
    assert_eq!(outcome.value[0].nodes, vec!["Payment", "Invoice"]);
}

#[tokio::test]
async fn test_out_of_range_degree_is_a_fallback() {
    let port = FixedCountPort {
        inner: commerce_graph(),
        count: "1e30".into(),
    };
    let outcome = DependencyAnalyzer::new(Arc::new(port), AnalyzerConfig::default())
        .find_critical_paths(10)
        .await;

    assert!(!outcome.diagnostics.parse_fallbacks.is_empty());
    assert!(outcome.diagnostics.parse_fallbacks.iter().all(|f| f.raw == "1e30"));
    assert!(outcome.value.is_empty());
}

#[tokio::test]
async fn test_huge_degrees_saturate() {
    let port = FixedCountPort {
        inner: commerce_graph(),
        count: u64::MAX.to_string(),
    };
    let outcome = DependencyAnalyzer::new(Arc::new(port), AnalyzerConfig::default())
        .find_critical_paths(10)
        .await;

    assert!(outcome.diagnostics.parse_fallbacks.is_empty());
    assert!(!outcome.value.is_empty());
    assert!(outcome.value.iter().all(|p| p.total_weight.is_finite() && p.is_critical));
}

#[tokio::test]
async fn test_orphans_skip_system_namespace() {
    let outcome = analyzer(commerce_graph()).analyze_orphaned_entities().await;

    assert_eq!(outcome.value.len(), 1);
    let conflict = &outcome.value[0];
    assert_eq!(conflict.conflict_type, ConflictType::OrphanedNode);
    assert_eq!(conflict.affected_nodes, vec!["Audit"]);
    assert!(!outcome.is_partial());
}

#[tokio::test]
async fn test_orphan_scan_limit() {
    let config = AnalyzerConfig::default().with_orphan_scan_limit(3);
    let outcome = DependencyAnalyzer::new(Arc::new(commerce_graph()), config)
        .analyze_orphaned_entities()
        .await;

    // Audit, Customer and Invoice are scanned; Audit is the only orphan.
    assert_eq!(outcome.value[0].affected_nodes, vec!["Audit"]);
    assert_eq!(outcome.diagnostics.limits_applied[0].limit, "orphan_scan_limit");
}

#[tokio::test]
async fn test_dangling_references() {
    let mut graph = commerce_graph();
    graph.add_edge("Report", "link", "Ledger");
    graph.add_edge("Audit", "link", "Ledger");

    let outcome = analyzer(graph).detect_dangling_references().await;

    assert_eq!(outcome.value.len(), 1);
    assert_eq!(outcome.value[0].conflict_type, ConflictType::DanglingReference);
    assert_eq!(outcome.value[0].affected_nodes, vec!["Ledger", "Report", "Audit"]);
}

#[tokio::test]
async fn test_health_report() {
    let mut graph = commerce_graph();
    graph.add_edge("Customer", "link", "Report");

    let report = analyzer(graph).analyze_health().await;

    assert_eq!(report.cycles.len(), 1);
    assert_eq!(report.orphans.len(), 1);
    assert!(report.dangling_references.is_empty());
    assert!(!report.critical_paths.is_empty());
    assert_eq!(report.conflict_count(), 2);
    assert!(!report.diagnostics.partial);
}
