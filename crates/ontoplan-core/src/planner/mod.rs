//! Migration planning.
//!
//! Planning runs in fixed stages:
//!
//! 1. [`grouping`] partitions breaking changes by owning entity.
//! 2. [`ordering`] queries the graph for dependencies among those entities
//!    and sorts them, tolerating cycles.
//! 3. The [`StrategyRegistry`] turns each entity's changes into steps,
//!    one rule kind at a time.
//! 4. [`rollback`] and [`downtime`] derive the rollback plan and the
//!    downtime windows from the forward steps.
//!
//! Failures in any stage are recorded in [`PlanDiagnostics`]; only a blank
//! target branch is rejected outright.

pub mod downtime;
pub mod grouping;
pub mod ordering;
pub mod rollback;
pub mod strategies;
pub mod strategy;

pub use grouping::{group, GroupedChanges};
pub use ordering::{topological_order, Ordering, OrderingGraph};
pub use strategy::{RuleKind, StepStrategy, StrategyRegistry};

use crate::config::PlannerConfig;
use crate::error::PlanError;
use crate::port::{GraphQueryPort, QueryRunner};
use indexmap::IndexMap;
use ontoplan_proto::{
    BreakingChange, MigrationPlan, MigrationStep, PlanDiagnostics, PlanParts, PlanStatus,
    UnknownRule, UNKNOWN_ENTITY,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Builds migration plans from breaking changes.
pub struct MigrationPlanner {
    runner: QueryRunner,
    config: PlannerConfig,
    registry: StrategyRegistry,
}

impl MigrationPlanner {
    /// Create a planner over a port, with strategies selected by the configuration.
    pub fn new(port: Arc<dyn GraphQueryPort>, config: PlannerConfig) -> Self {
        let runner = QueryRunner::new(port, config.retry.clone());
        let registry = StrategyRegistry::from_config(&config);
        Self {
            runner,
            config,
            registry,
        }
    }

    /// Use a custom strategy registry.
    pub fn with_registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the strategy for one rule kind.
    pub fn with_strategy(mut self, kind: RuleKind, strategy: Arc<dyn StepStrategy>) -> Self {
        self.registry = self.registry.with_strategy(kind, strategy);
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Get the strategy registry.
    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Build a plan for `changes` targeting `target_branch`.
    #[instrument(skip(self, changes), fields(changes = changes.len()))]
    pub async fn plan(
        &self,
        changes: &[BreakingChange],
        target_branch: &str,
    ) -> Result<MigrationPlan, PlanError> {
        if target_branch.trim().is_empty() {
            return Err(PlanError::InvalidInput("target branch is empty".into()));
        }

        let grouped = group(changes);
        let mut diagnostics = PlanDiagnostics {
            dropped_changes: grouped.dropped.clone(),
            unattributed_changes: grouped.unattributed_count(),
            ..Default::default()
        };

        let graph_entities: Vec<String> = grouped.entities().map(str::to_string).collect();
        let (graph, skipped) = ordering::build_graph(
            &self.runner,
            &graph_entities,
            &self.config.ordering_relations,
            self.config.max_concurrent_queries,
        )
        .await;
        debug!(
            entities = graph_entities.len(),
            edges = graph.edge_count(),
            "Built ordering graph"
        );
        if !skipped.is_empty() {
            diagnostics.ordering_partial = true;
            diagnostics.skipped = skipped;
        }

        let sorted = topological_order(&graph);
        let mut execution_order = sorted.order;
        diagnostics.cycle = sorted.cycle;

        let mut steps: Vec<MigrationStep> = Vec::new();
        for entity in &execution_order {
            let Some(entity_changes) = grouped.groups.get(entity) else {
                continue;
            };
            steps.extend(self.synthesize_entity(entity, entity_changes, &mut diagnostics));
        }

        // The unattributed bucket has no graph node and always runs last.
        if !grouped.unattributed.is_empty() {
            steps.extend(self.synthesize_entity(UNKNOWN_ENTITY, &grouped.unattributed, &mut diagnostics));
            execution_order.push(UNKNOWN_ENTITY.to_string());
        }

        let rollback_steps = rollback::derive_rollback(&steps, self.config.rollback_duration_factor);
        let downtime_windows = downtime::downtime_windows(&steps);
        let status = if changes.is_empty() {
            PlanStatus::Completed
        } else {
            PlanStatus::Draft
        };

        let plan = MigrationPlan::from_parts(PlanParts {
            breaking_changes: changes.to_vec(),
            target_branch: target_branch.to_string(),
            steps,
            rollback_steps,
            execution_order,
            downtime_windows,
            status,
            diagnostics,
        });

        info!(
            plan_id = %plan.id(),
            steps = plan.steps().len(),
            rollback_steps = plan.rollback_steps().len(),
            duration_secs = plan.estimated_duration_seconds(),
            downtime_secs = plan.total_downtime_seconds(),
            clean = plan.diagnostics().is_clean(),
            "Migration plan created"
        );
        Ok(plan)
    }

    /// Steps for one entity, one rule kind at a time in first-appearance order.
    fn synthesize_entity(
        &self,
        entity: &str,
        changes: &[BreakingChange],
        diagnostics: &mut PlanDiagnostics,
    ) -> Vec<MigrationStep> {
        let mut by_kind: IndexMap<RuleKind, Vec<BreakingChange>> = IndexMap::new();
        for change in changes {
            match RuleKind::parse(&change.rule_id) {
                Some(kind) => by_kind.entry(kind).or_default().push(change.clone()),
                None => {
                    warn!(entity, rule_id = %change.rule_id, "No strategy for rule, skipping change");
                    diagnostics.unknown_rules.push(UnknownRule {
                        entity: entity.to_string(),
                        rule_id: change.rule_id.clone(),
                    });
                }
            }
        }

        let mut steps = Vec::new();
        for (kind, kind_changes) in by_kind {
            let strategy = self.registry.get(kind);
            let synthesized = strategy.synthesize(entity, &kind_changes, &self.config);
            debug!(
                entity,
                rule = %kind,
                strategy = strategy.name(),
                steps = synthesized.len(),
                "Synthesized steps"
            );
            steps.extend(synthesized);
        }
        steps
    }
}
