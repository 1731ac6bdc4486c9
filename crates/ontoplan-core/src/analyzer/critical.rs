//! Critical path ranking between highly connected entities.

use super::{parse_count, record_failure, BranchError, DependencyAnalyzer};
use crate::port::Deadline;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use ontoplan_proto::{
    AnalysisOutcome, Binding, BindingValue, DependencyPath, Diagnostics, GraphQuery, Pattern,
    RelationPath, Term,
};
use tracing::{debug, info, instrument};

impl DependencyAnalyzer {
    /// Rank paths between the most connected entities.
    ///
    /// Degrees count distinct neighbours over all relation kinds. Each path
    /// between two hubs scores `(degree_a + degree_b) / hops`.
    #[instrument(skip(self))]
    pub async fn find_critical_paths(&self, max_paths: usize) -> AnalysisOutcome<Vec<DependencyPath>> {
        let deadline = self.deadline();
        let mut diagnostics = Diagnostics::default();

        let out_query = self.degree_query(true);
        let in_query = self.degree_query(false);
        let (outgoing, incoming) = tokio::join!(
            self.fetch(deadline, &out_query),
            self.fetch(deadline, &in_query),
        );

        let mut degrees: IndexMap<String, u64> = IndexMap::new();
        for (branch, result) in [("out-degree", outgoing), ("in-degree", incoming)] {
            match result {
                Ok(rows) => accumulate_degrees(&rows, &mut degrees, &mut diagnostics),
                Err(e) => record_failure(&mut diagnostics, branch.to_string(), e),
            }
        }

        let mut hubs: Vec<(String, u64)> = degrees
            .into_iter()
            .filter(|(_, degree)| *degree >= self.config.min_hub_degree)
            .collect();
        hubs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if hubs.len() > self.config.hub_candidates {
            diagnostics.limit("hub_candidates", self.config.hub_candidates, hubs.len());
            hubs.truncate(self.config.hub_candidates);
        }

        let pool = &hubs[..hubs.len().min(self.config.hub_pair_pool)];
        let pairs: Vec<(&(String, u64), &(String, u64))> = pool
            .iter()
            .flat_map(move |a| pool.iter().filter(move |b| b.0 != a.0).map(move |b| (a, b)))
            .collect();
        debug!(hubs = hubs.len(), pairs = pairs.len(), "Searching hub paths");

        let searches: Vec<_> = stream::iter(pairs)
            .map(|(a, b)| async move { (a, b, self.hub_paths(deadline, &a.0, &b.0).await) })
            .buffered(self.concurrency())
            .collect()
            .await;

        let mut paths: Vec<DependencyPath> = Vec::new();
        for (a, b, result) in searches {
            let found = match result {
                Ok(found) => found,
                Err(e) => {
                    record_failure(&mut diagnostics, format!("paths {} -> {}", a.0, b.0), e);
                    continue;
                }
            };
            for nodes in found {
                let hops = nodes.len().saturating_sub(1).max(1);
                let total_weight = a.1.saturating_add(b.1) as f64 / hops as f64;
                paths.push(DependencyPath {
                    is_critical: total_weight >= self.config.critical_path_weight,
                    total_weight,
                    nodes,
                });
            }
        }

        paths.sort_by(|x, y| {
            y.total_weight
                .total_cmp(&x.total_weight)
                .then_with(|| x.hops().cmp(&y.hops()))
                .then_with(|| x.nodes.cmp(&y.nodes))
        });
        paths.truncate(max_paths);

        info!(paths = paths.len(), partial = diagnostics.partial, "Critical path search complete");
        AnalysisOutcome::new(paths, diagnostics)
    }

    /// Node sequences from `source` to `target`, through the cache when present.
    async fn hub_paths(
        &self,
        deadline: Deadline,
        source: &str,
        target: &str,
    ) -> Result<Vec<Vec<String>>, BranchError> {
        let depth = self.config.max_depth;
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.paths(source, target, depth)) {
            return Ok(cached);
        }

        let rows = self.fetch(deadline, &self.pair_query(source, target)).await?;
        let found: Vec<Vec<String>> = rows
            .iter()
            .filter_map(|row| row.get("p").and_then(BindingValue::as_path))
            .map(<[String]>::to_vec)
            .collect();

        if let Some(cache) = &self.cache {
            cache.store_paths(source, target, depth, found.clone());
        }
        Ok(found)
    }

    /// Distinct neighbour count per node, outgoing or incoming.
    fn degree_query(&self, outgoing: bool) -> GraphQuery {
        let (subject, object) = if outgoing { ("n", "m") } else { ("m", "n") };
        GraphQuery::select(["n", "deg"])
            .with_pattern(Pattern::path(
                Term::var(subject),
                RelationPath::single_hop(self.config.relation_kinds.clone()),
                Term::var(object),
            ))
            .with_group_count("n", "m", "deg")
    }

    /// Bounded paths from `source` to `target`, binding the node sequence.
    fn pair_query(&self, source: &str, target: &str) -> GraphQuery {
        GraphQuery::select(["p"])
            .with_pattern(Pattern::path_bound(
                Term::node(source),
                RelationPath::bounded(self.config.relation_kinds.clone(), self.config.max_depth),
                Term::node(target),
                "p",
            ))
            .limit(self.config.max_paths_per_pair)
    }
}

fn accumulate_degrees(rows: &[Binding], degrees: &mut IndexMap<String, u64>, diagnostics: &mut Diagnostics) {
    for row in rows {
        let Some(node) = row.get("n").and_then(BindingValue::as_str) else {
            diagnostics.parse_fallback("n", "<unbound>");
            continue;
        };
        let count = parse_count(row, "deg", diagnostics);
        let degree = degrees.entry(node.to_string()).or_default();
        *degree = degree.saturating_add(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(node: &str, deg: &str) -> Binding {
        let mut row = Binding::new();
        row.insert("n".into(), BindingValue::Node(node.into()));
        row.insert("deg".into(), BindingValue::Literal(deg.into()));
        row
    }

    #[test]
    fn test_degrees_sum_in_and_out() {
        let mut degrees = IndexMap::new();
        let mut diagnostics = Diagnostics::default();
        accumulate_degrees(&[row("A", "2"), row("B", "1")], &mut degrees, &mut diagnostics);
        accumulate_degrees(&[row("A", "3")], &mut degrees, &mut diagnostics);
        assert_eq!(degrees["A"], 5);
        assert_eq!(degrees["B"], 1);
        assert!(diagnostics.is_clean());
    }

    #[test]
    fn test_bad_degree_counts_as_zero() {
        let mut degrees = IndexMap::new();
        let mut diagnostics = Diagnostics::default();
        accumulate_degrees(&[row("A", "n/a")], &mut degrees, &mut diagnostics);
        assert_eq!(degrees["A"], 0);
        assert_eq!(diagnostics.parse_fallbacks.len(), 1);
    }

    #[test]
    fn test_degree_sum_saturates() {
        let mut degrees = IndexMap::new();
        let mut diagnostics = Diagnostics::default();
        let max = u64::MAX.to_string();
        accumulate_degrees(&[row("A", &max), row("A", &max)], &mut degrees, &mut diagnostics);
        assert_eq!(degrees["A"], u64::MAX);
        assert!(diagnostics.is_clean());
    }
}
