//! Analyzer and planner configuration.
//!
//! Every cap and default duration lives here and is passed to component
//! constructors. All structs deserialize with defaults, so a JSON file only
//! needs to name the values it overrides.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default relation kinds treated as dependency edges.
pub const DEFAULT_RELATION_KINDS: &[&str] = &["link", "interface-extends"];

/// Default maximum depth for path searches.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Default number of direct dependents expanded transitively.
pub const DEFAULT_MAX_TRANSITIVE_SOURCES: usize = 10;

/// Default number of entities inspected by the orphan scan.
pub const DEFAULT_ORPHAN_SCAN_LIMIT: usize = 100;

/// Default number of hub candidates kept by degree.
pub const DEFAULT_HUB_CANDIDATES: usize = 20;

/// Default number of hubs paired up for path search.
pub const DEFAULT_HUB_PAIR_POOL: usize = 5;

/// Default batch size for batched steps.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Retry policy for graph queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per query, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound for the backoff delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Per-attempt timeout, in milliseconds.
    pub query_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
            query_timeout_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Set the number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the initial backoff.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Per-attempt timeout.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Backoff before retry number `retry` (1-based), doubling up to the maximum.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        let ms = self.initial_backoff_ms.saturating_mul(factor);
        Duration::from_millis(ms.min(self.max_backoff_ms))
    }
}

/// Configuration for the dependency analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Relations treated as dependency edges (`A rel B`: A depends on B).
    pub relation_kinds: Vec<String>,
    /// Predicate that types a node.
    pub type_predicate: String,
    /// Class of entity nodes.
    pub entity_class: String,
    /// Predicate carrying a node's impact level.
    pub impact_level_predicate: String,
    /// Impact level value that marks a node critical.
    pub critical_level: String,
    /// Direct dependents expanded transitively.
    pub max_transitive_sources: usize,
    /// Maximum hops for transitive and critical-path searches.
    pub max_depth: usize,
    /// Longest cycle searched for.
    pub max_cycle_length: usize,
    /// Nodes kept after ranking by degree.
    pub hub_candidates: usize,
    /// Top hubs paired up for path search.
    pub hub_pair_pool: usize,
    /// Minimum total degree for a hub candidate.
    pub min_hub_degree: u64,
    /// Paths fetched per hub pair.
    pub max_paths_per_pair: usize,
    /// Score at or above which a path is critical.
    pub critical_path_weight: f64,
    /// Paths returned by the health report.
    pub default_critical_paths: usize,
    /// Entities inspected by the orphan scan.
    pub orphan_scan_limit: usize,
    /// Id prefix of system entities, ignored by the orphan scan.
    pub system_namespace: String,
    /// Affected count at which a staged rollout is recommended.
    pub large_impact_threshold: usize,
    /// Queries in flight at once.
    pub max_concurrent_queries: usize,
    /// Deadline for a whole analysis call, in milliseconds.
    pub analysis_timeout_ms: Option<u64>,
    pub retry: RetryConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            relation_kinds: DEFAULT_RELATION_KINDS.iter().map(|s| s.to_string()).collect(),
            type_predicate: "type".to_string(),
            entity_class: "ObjectType".to_string(),
            impact_level_predicate: "impactLevel".to_string(),
            critical_level: "critical".to_string(),
            max_transitive_sources: DEFAULT_MAX_TRANSITIVE_SOURCES,
            max_depth: DEFAULT_MAX_DEPTH,
            max_cycle_length: 6,
            hub_candidates: DEFAULT_HUB_CANDIDATES,
            hub_pair_pool: DEFAULT_HUB_PAIR_POOL,
            min_hub_degree: 2,
            max_paths_per_pair: 10,
            critical_path_weight: 4.0,
            default_critical_paths: 10,
            orphan_scan_limit: DEFAULT_ORPHAN_SCAN_LIMIT,
            system_namespace: "system:".to_string(),
            large_impact_threshold: 10,
            max_concurrent_queries: 4,
            analysis_timeout_ms: None,
            retry: RetryConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Set the dependency relation kinds.
    pub fn with_relation_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relation_kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Set the maximum path depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    /// Set how many direct dependents are expanded transitively.
    pub fn with_max_transitive_sources(mut self, sources: usize) -> Self {
        self.max_transitive_sources = sources;
        self
    }

    /// Set the orphan scan limit.
    pub fn with_orphan_scan_limit(mut self, limit: usize) -> Self {
        self.orphan_scan_limit = limit;
        self
    }

    /// Set the system namespace prefix.
    pub fn with_system_namespace(mut self, prefix: impl Into<String>) -> Self {
        self.system_namespace = prefix.into();
        self
    }

    /// Set the minimum hub degree.
    pub fn with_min_hub_degree(mut self, degree: u64) -> Self {
        self.min_hub_degree = degree;
        self
    }

    /// Set the analysis deadline.
    pub fn with_analysis_timeout(mut self, timeout: Duration) -> Self {
        self.analysis_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the query retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Analysis deadline, if any.
    pub fn analysis_timeout(&self) -> Option<Duration> {
        self.analysis_timeout_ms.map(Duration::from_millis)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), Error> {
        if self.relation_kinds.is_empty() {
            return Err(Error::Config("analyzer.relation_kinds is empty".into()));
        }
        if self.max_concurrent_queries == 0 {
            return Err(Error::Config("analyzer.max_concurrent_queries must be > 0".into()));
        }
        if self.hub_pair_pool > self.hub_candidates {
            return Err(Error::Config(
                "analyzer.hub_pair_pool exceeds analyzer.hub_candidates".into(),
            ));
        }
        Ok(())
    }
}

/// Strategy for primary-key changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryKeyStrategy {
    /// Copy into a re-keyed temporary collection, then swap.
    CopyThenSwitch,
    /// Add the new key as a nullable column, backfill, then enforce.
    BackfillNullable,
}

/// Strategy for removing required fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredFieldStrategy {
    /// Relax to nullable, wait for consumers, then drop.
    MakeNullableFirst,
    /// Fill defaults, then drop.
    SetDefaultValues,
}

/// Default step durations, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepDurations {
    pub create_temp_collection: u64,
    /// Used when a change carries no impact estimate.
    pub copy_with_transformation: u64,
    pub verify_data_integrity: u64,
    pub atomic_switch: u64,
    pub add_nullable_column: u64,
    pub backfill_data: u64,
    pub make_required_and_switch: u64,
    pub make_fields_nullable: u64,
    pub remove_fields: u64,
    pub set_default_values: u64,
    pub create_conversion_function: u64,
    pub progressive_conversion: u64,
    pub verify_conversion: u64,
}

impl Default for StepDurations {
    fn default() -> Self {
        Self {
            create_temp_collection: 5,
            copy_with_transformation: 300,
            verify_data_integrity: 60,
            atomic_switch: 10,
            add_nullable_column: 5,
            backfill_data: 300,
            make_required_and_switch: 60,
            make_fields_nullable: 5,
            remove_fields: 30,
            set_default_values: 120,
            create_conversion_function: 5,
            progressive_conversion: 300,
            verify_conversion: 60,
        }
    }
}

/// Configuration for the migration planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Relations that order entities (`A rel B`: B is migrated before A).
    pub ordering_relations: Vec<String>,
    pub primary_key_strategy: PrimaryKeyStrategy,
    pub required_field_strategy: RequiredFieldStrategy,
    pub durations: StepDurations,
    pub default_batch_size: usize,
    /// Throughput used to turn an affected-row estimate into seconds.
    pub rows_per_second: u64,
    /// Scale applied to forward durations for rollback steps.
    pub rollback_duration_factor: f64,
    /// Suffix of temporary collections.
    pub temp_collection_suffix: String,
    /// Queries in flight at once while building the dependency graph.
    pub max_concurrent_queries: usize,
    pub retry: RetryConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            ordering_relations: vec!["link".to_string()],
            primary_key_strategy: PrimaryKeyStrategy::CopyThenSwitch,
            required_field_strategy: RequiredFieldStrategy::MakeNullableFirst,
            durations: StepDurations::default(),
            default_batch_size: DEFAULT_BATCH_SIZE,
            rows_per_second: 1000,
            rollback_duration_factor: 0.5,
            temp_collection_suffix: "__migration_tmp".to_string(),
            max_concurrent_queries: 4,
            retry: RetryConfig::default(),
        }
    }
}

impl PlannerConfig {
    /// Set the ordering relations.
    pub fn with_ordering_relations<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ordering_relations = relations.into_iter().map(Into::into).collect();
        self
    }

    /// Set the primary-key strategy.
    pub fn with_primary_key_strategy(mut self, strategy: PrimaryKeyStrategy) -> Self {
        self.primary_key_strategy = strategy;
        self
    }

    /// Set the required-field strategy.
    pub fn with_required_field_strategy(mut self, strategy: RequiredFieldStrategy) -> Self {
        self.required_field_strategy = strategy;
        self
    }

    /// Set the rollback duration factor.
    pub fn with_rollback_duration_factor(mut self, factor: f64) -> Self {
        self.rollback_duration_factor = factor;
        self
    }

    /// Set the query retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.rollback_duration_factor.is_finite() && self.rollback_duration_factor >= 0.0) {
            return Err(Error::Config(
                "planner.rollback_duration_factor must be a non-negative number".into(),
            ));
        }
        if self.default_batch_size == 0 {
            return Err(Error::Config("planner.default_batch_size must be > 0".into()));
        }
        if self.max_concurrent_queries == 0 {
            return Err(Error::Config("planner.max_concurrent_queries must be > 0".into()));
        }
        Ok(())
    }
}

/// Root of a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OntoplanConfig {
    pub analyzer: AnalyzerConfig,
    pub planner: PlannerConfig,
}

impl OntoplanConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: OntoplanConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Check both sections.
    pub fn validate(&self) -> Result<(), Error> {
        self.analyzer.validate()?;
        self.planner.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_caps() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.max_transitive_sources, 10);
        assert_eq!(config.max_depth, 5);
        assert_eq!(config.orphan_scan_limit, 100);
        assert_eq!(config.hub_candidates, 20);
        assert_eq!(config.hub_pair_pool, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryConfig {
            initial_backoff_ms: 100,
            max_backoff_ms: 300,
            ..Default::default()
        };
        assert_eq!(retry.backoff(1), Duration::from_millis(100));
        assert_eq!(retry.backoff(2), Duration::from_millis(200));
        assert_eq!(retry.backoff(3), Duration::from_millis(300));
        assert_eq!(retry.backoff(30), Duration::from_millis(300));
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = OntoplanConfig::from_json(
            r#"{"analyzer": {"max_depth": 3}, "planner": {"primary_key_strategy": "backfill_nullable"}}"#,
        )
        .unwrap();
        assert_eq!(config.analyzer.max_depth, 3);
        assert_eq!(config.analyzer.orphan_scan_limit, 100);
        assert_eq!(
            config.planner.primary_key_strategy,
            PrimaryKeyStrategy::BackfillNullable
        );
        assert_eq!(config.planner.durations.atomic_switch, 10);
    }

    #[test]
    fn test_validation_rejects_empty_relations() {
        let config = AnalyzerConfig::default().with_relation_kinds(Vec::<String>::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_negative_factor() {
        let config = PlannerConfig::default().with_rollback_duration_factor(-1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ontoplan.json");
        std::fs::write(&path, r#"{"analyzer": {"system_namespace": "sys/"}}"#).unwrap();

        let config = OntoplanConfig::load(&path).unwrap();
        assert_eq!(config.analyzer.system_namespace, "sys/");
    }
}
