//! Dependency ordering of grouped entities.
//!
//! Ordering edges point from the entity that must be migrated first to the
//! entity that depends on it. The graph triple `A link B` (A depends on B)
//! becomes the ordering edge `B -> A`.

use crate::port::QueryRunner;
use futures::stream::{self, StreamExt};
use indexmap::{IndexMap, IndexSet};
use ontoplan_proto::{
    binding_str, CycleDiagnostic, GraphQuery, Pattern, RelationPath, SkippedBranch, Term,
};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Directed graph over entities; nodes keep their encounter order.
#[derive(Debug, Clone, Default)]
pub struct OrderingGraph {
    nodes: IndexSet<String>,
    edges: IndexMap<String, IndexSet<String>>,
}

impl OrderingGraph {
    /// Create a graph with the given nodes and no edges.
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: nodes.into_iter().map(Into::into).collect(),
            edges: IndexMap::new(),
        }
    }

    /// Add `source -> target` (target depends on source).
    ///
    /// Edges touching unknown nodes and self-loops are ignored.
    pub fn add_edge(&mut self, source: &str, target: &str) -> bool {
        if source == target || !self.nodes.contains(source) || !self.nodes.contains(target) {
            return false;
        }
        self.edges
            .entry(source.to_string())
            .or_default()
            .insert(target.to_string())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    /// All edges as `(source, target)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.edges
            .iter()
            .flat_map(|(s, targets)| targets.iter().map(move |t| (s.as_str(), t.as_str())))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(IndexSet::len).sum()
    }
}

/// Result of sorting an ordering graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
    /// Every node exactly once.
    pub order: Vec<String>,
    /// Nodes left in cycles, appended to `order` in encounter order.
    pub cycle: Option<CycleDiagnostic>,
}

/// Kahn's algorithm; ties break by encounter order.
pub fn topological_order(graph: &OrderingGraph) -> Ordering {
    let count = graph.nodes.len();
    let mut in_degree = vec![0usize; count];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];

    for (source, target) in graph.edges() {
        if let (Some(s), Some(t)) = (graph.nodes.get_index_of(source), graph.nodes.get_index_of(target)) {
            successors[s].push(t);
            in_degree[t] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
    let mut placed = vec![false; count];
    let mut order = Vec::with_capacity(count);

    while let Some(next) = ready.pop_first() {
        placed[next] = true;
        order.push(graph.nodes[next].clone());
        for &successor in &successors[next] {
            in_degree[successor] -= 1;
            if in_degree[successor] == 0 {
                ready.insert(successor);
            }
        }
    }

    let residue: Vec<String> = (0..count)
        .filter(|&i| !placed[i])
        .map(|i| graph.nodes[i].clone())
        .collect();
    let cycle = if residue.is_empty() {
        None
    } else {
        warn!(entities = ?residue, "Dependency cycle among migrated entities");
        order.extend(residue.iter().cloned());
        Some(CycleDiagnostic { entities: residue })
    };

    Ordering { order, cycle }
}

/// Query each entity's outgoing ordering relations and build the graph.
///
/// A failed query leaves that entity's edges out and is returned as a
/// skipped branch.
pub async fn build_graph(
    runner: &QueryRunner,
    entities: &[String],
    relations: &[String],
    concurrency: usize,
) -> (OrderingGraph, Vec<SkippedBranch>) {
    let mut graph = OrderingGraph::new(entities.iter().cloned());
    let mut skipped = Vec::new();
    if relations.is_empty() {
        return (graph, skipped);
    }

    let lookups: Vec<_> = stream::iter(entities.iter())
        .map(|entity| async move {
            let query = GraphQuery::select(["target"]).distinct().with_pattern(Pattern::path(
                Term::node(entity),
                RelationPath::single_hop(relations.to_vec()),
                Term::var("target"),
            ));
            (entity, runner.run(&query).await)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    for (entity, result) in lookups {
        match result {
            Ok(rows) => {
                for target in rows.iter().filter_map(|row| binding_str(row, "target")) {
                    // `entity` depends on `target`, so `target` goes first.
                    if graph.add_edge(target, entity) {
                        debug!(from = target, to = %entity, "Ordering edge");
                    }
                }
            }
            Err(e) => {
                warn!(entity = %entity, error = %e, "Dependency lookup failed, ordering may be incomplete");
                skipped.push(SkippedBranch {
                    branch: format!("dependencies of {entity}"),
                    reason: e.to_string(),
                });
            }
        }
    }

    (graph, skipped)
}
