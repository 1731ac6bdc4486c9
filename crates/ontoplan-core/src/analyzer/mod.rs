//! Dependency analysis over the ontology graph.
//!
//! The analyzer answers four questions through the graph query port: what a
//! change to one entity affects, which dependency cycles exist, which paths
//! connect the most central entities, and which entities are disconnected.
//! Every answer carries [`Diagnostics`]; failures degrade the result instead
//! of aborting the call.
//!
//! Edge convention: the triple `A <relation> B` means A depends on B.

mod critical;
mod cycles;
mod impact;
mod orphans;

pub use cycles::cycle_severity;
pub use impact::{assess_risk, recommend};

use crate::cache::AnalysisCache;
use crate::config::AnalyzerConfig;
use crate::error::QueryError;
use crate::port::{Deadline, GraphQueryPort, QueryRunner};
use ontoplan_proto::{Binding, BindingValue, Diagnostics, GraphQuery, HealthReport, Pattern, Term};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Why a query branch produced no rows.
#[derive(Debug)]
enum BranchError {
    /// The analysis deadline passed.
    Expired,
    /// The query failed after retries.
    Query(QueryError),
}

/// Runs dependency analyses against a graph query port.
pub struct DependencyAnalyzer {
    runner: QueryRunner,
    config: AnalyzerConfig,
    cache: Option<Arc<AnalysisCache>>,
}

impl DependencyAnalyzer {
    /// Create an analyzer over a port.
    pub fn new(port: Arc<dyn GraphQueryPort>, config: AnalyzerConfig) -> Self {
        let runner = QueryRunner::new(port, config.retry.clone());
        Self {
            runner,
            config,
            cache: None,
        }
    }

    /// Memoize impact reports and path searches in `cache`.
    pub fn with_cache(mut self, cache: Arc<AnalysisCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Get the memo cache, if any.
    pub fn cache(&self) -> Option<&Arc<AnalysisCache>> {
        self.cache.as_ref()
    }

    /// Run every structural check concurrently and merge the results.
    #[instrument(skip(self))]
    pub async fn analyze_health(&self) -> HealthReport {
        let (cycles, orphans, dangling, paths) = tokio::join!(
            self.detect_circular_dependencies(),
            self.analyze_orphaned_entities(),
            self.detect_dangling_references(),
            self.find_critical_paths(self.config.default_critical_paths),
        );

        let mut diagnostics = Diagnostics::default();
        diagnostics.merge(cycles.diagnostics);
        diagnostics.merge(orphans.diagnostics);
        diagnostics.merge(dangling.diagnostics);
        diagnostics.merge(paths.diagnostics);

        let report = HealthReport {
            cycles: cycles.value,
            orphans: orphans.value,
            dangling_references: dangling.value,
            critical_paths: paths.value,
            diagnostics,
        };
        info!(
            conflicts = report.conflict_count(),
            critical_paths = report.critical_paths.len(),
            partial = report.diagnostics.partial,
            "Health analysis complete"
        );
        report
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.config.analysis_timeout())
    }

    fn concurrency(&self) -> usize {
        self.config.max_concurrent_queries.max(1)
    }

    /// Run one query branch under the analysis deadline.
    async fn fetch(&self, deadline: Deadline, query: &GraphQuery) -> Result<Vec<Binding>, BranchError> {
        if deadline.expired() {
            return Err(BranchError::Expired);
        }
        match deadline.run(self.runner.run(query)).await {
            Some(result) => result.map_err(BranchError::Query),
            None => Err(BranchError::Expired),
        }
    }

    /// `?var <type_predicate> <entity_class>`.
    fn entity_pattern(&self, var: &str) -> Pattern {
        Pattern::triple(
            Term::var(var),
            Term::node(&self.config.type_predicate),
            Term::node(&self.config.entity_class),
        )
    }
}

/// Log a failed branch and record it in the diagnostics.
fn record_failure(diagnostics: &mut Diagnostics, branch: String, error: BranchError) {
    match error {
        BranchError::Expired => {
            warn!(branch = %branch, "Analysis deadline exceeded, skipping branch");
            diagnostics.truncate(branch);
        }
        BranchError::Query(e) => {
            warn!(branch = %branch, error = %e, "Graph query failed, skipping branch");
            diagnostics.skip(branch, e.to_string());
        }
    }
}

/// Values bound to `var`, in row order. Rows without a usable value are
/// recorded as parse fallbacks.
fn column(rows: &[Binding], var: &str, diagnostics: &mut Diagnostics) -> Vec<String> {
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        match row.get(var).and_then(BindingValue::as_str) {
            Some(value) => values.push(value.to_string()),
            None => diagnostics.parse_fallback(
                var,
                row.get(var).map(BindingValue::raw).unwrap_or_else(|| "<unbound>".into()),
            ),
        }
    }
    values
}

/// Parse a count binding, defaulting to zero and recording the fallback.
fn parse_count(row: &Binding, var: &str, diagnostics: &mut Diagnostics) -> u64 {
    match row.get(var) {
        Some(value) => match value.as_count() {
            Some(n) => n,
            None => {
                warn!(variable = var, raw = %value.raw(), "Unparseable count, using 0");
                diagnostics.parse_fallback(var, value.raw());
                0
            }
        },
        None => {
            diagnostics.parse_fallback(var, "<unbound>");
            0
        }
    }
}
