//! Integration tests for the migration planner.

use async_trait::async_trait;
use ontoplan_core::{
    GraphQueryPort, MemoryGraph, MigrationPlanner, PlanError, PlannerConfig, PrimaryKeyStrategy,
    QueryError, RequiredFieldStrategy, RetryConfig, RuleKind, StepStrategy,
};
use ontoplan_proto::{
    Binding, BreakingChange, GraphQuery, ImpactEstimate, MigrationPlan, MigrationStep, PlanStatus,
    ResourceType, Severity, StepScript, StepType, UNKNOWN_ENTITY,
};
use std::sync::Arc;

fn planner(graph: MemoryGraph) -> MigrationPlanner {
    MigrationPlanner::new(Arc::new(graph), PlannerConfig::default())
}

fn pk_change(entity: &str) -> BreakingChange {
    BreakingChange::entity("primary_key_change", Severity::Critical, entity)
        .with_metadata("old_primary_key", "id")
        .with_metadata("new_primary_key", format!("{}_number", entity.to_lowercase()))
        .with_impact(ImpactEstimate::rows(50_000))
}

fn field_removal(entity: &str, field: &str) -> BreakingChange {
    BreakingChange::property("required_field_removal", Severity::High, entity, field)
}

fn type_change(entity: &str, field: &str) -> BreakingChange {
    BreakingChange::property("data_type_change", Severity::High, entity, field)
        .with_values("string", "decimal")
}

fn step_types(steps: &[MigrationStep]) -> Vec<StepType> {
    steps.iter().map(|s| s.step_type).collect()
}

fn position(plan: &MigrationPlan, entity: &str) -> usize {
    plan.execution_order()
        .iter()
        .position(|e| e == entity)
        .unwrap_or_else(|| panic!("{entity} missing from execution order"))
}

/// Fails every query.
struct DownPort;

#[async_trait]
impl GraphQueryPort for DownPort {
    async fn query(&self, _query: &GraphQuery) -> Result<Vec<Binding>, QueryError> {
        Err(QueryError::Unavailable("connection refused".into()))
    }
}

/// Emits a single manual step per entity.
struct ManualReview;

impl StepStrategy for ManualReview {
    fn name(&self) -> &'static str {
        "manual-review"
    }

    fn synthesize(&self, entity: &str, changes: &[BreakingChange], _config: &PlannerConfig) -> Vec<MigrationStep> {
        vec![MigrationStep::new(
            StepType::DeprecationPeriod,
            entity,
            format!("Review {} type changes on {}", changes.len(), entity),
            StepScript::AwaitApproval {
                reason: "manual type review".into(),
            },
            0,
        )
        .with_metadata("manual", true)]
    }
}

#[tokio::test]
async fn test_scenario_a_copy_then_switch() {
    let plan = planner(MemoryGraph::new())
        .plan(&[pk_change("Order")], "main")
        .await
        .unwrap();

    assert_eq!(
        step_types(plan.steps()),
        vec![
            StepType::CreateTempCollection,
            StepType::CopyWithTransformation,
            StepType::VerifyDataIntegrity,
            StepType::AtomicSwitch,
        ]
    );
    let downtime: Vec<bool> = plan.steps().iter().map(|s| s.requires_downtime).collect();
    assert_eq!(downtime, vec![false, false, false, true]);
    assert_eq!(plan.steps()[3].estimated_duration_seconds, 10);
    assert_eq!(plan.steps()[1].estimated_duration_seconds, 50);

    assert_eq!(plan.downtime_windows().len(), 1);
    let window = &plan.downtime_windows()[0];
    assert_eq!((window.start_step, window.end_step), (3, 3));
    assert_eq!(window.duration, 10);

    assert_eq!(plan.execution_order(), ["Order".to_string()]);
    assert!(plan.requires_downtime());
    assert_eq!(plan.estimated_duration_seconds(), 5 + 50 + 60 + 10);
    assert_eq!(plan.status(), PlanStatus::Draft);
    assert_eq!(plan.target_branch(), "main");
    assert_eq!(plan.id().len(), 32);
    assert!(plan.diagnostics().is_clean());
}

#[tokio::test]
async fn test_scenario_b_unrelated_entities() {
    let plan = planner(MemoryGraph::new())
        .plan(&[pk_change("Order"), type_change("Product", "price")], "main")
        .await
        .unwrap();

    assert_eq!(plan.execution_order().len(), 2);
    assert_eq!(plan.steps_for_entity("Order").count(), 4);
    assert_eq!(plan.steps_for_entity("Product").count(), 3);
    assert!(plan.diagnostics().cycle.is_none());
}

#[tokio::test]
async fn test_scenario_c_cycle_is_diagnosed() {
    let mut graph = MemoryGraph::new();
    graph.add_edge("A", "link", "B").add_edge("B", "link", "A");

    let plan = planner(graph)
        .plan(&[pk_change("A"), pk_change("B")], "main")
        .await
        .unwrap();

    assert_eq!(plan.execution_order(), ["A".to_string(), "B".to_string()]);
    let cycle = plan.diagnostics().cycle.as_ref().unwrap();
    assert_eq!(cycle.entities, vec!["A", "B"]);
    assert_eq!(plan.steps().len(), 8);
}

#[tokio::test]
async fn test_scenario_d_make_nullable_first() {
    let changes = vec![
        field_removal("User", "email"),
        field_removal("User", "phone"),
        field_removal("User", "fax"),
    ];
    let plan = planner(MemoryGraph::new()).plan(&changes, "main").await.unwrap();

    assert_eq!(
        step_types(plan.steps()),
        vec![
            StepType::MakeFieldsNullable,
            StepType::DeprecationPeriod,
            StepType::RemoveFields,
        ]
    );
    assert_eq!(plan.steps()[1].estimated_duration_seconds, 0);
    assert!(plan.steps()[1].is_manual());
    assert!(!plan.requires_downtime());
    assert_eq!(plan.rollback_steps().len(), 1);
}

#[tokio::test]
async fn test_dependency_goes_first() {
    // Invoice depends on Order, so Order is migrated first.
    let mut graph = MemoryGraph::new();
    graph
        .add_edge("Invoice", "link", "Order")
        .add_edge("Order", "link", "Customer")
        .add_edge("Invoice", "interface-extends", "Document");

    let changes = vec![
        type_change("Invoice", "total"),
        pk_change("Order"),
        field_removal("Customer", "fax"),
        pk_change("Document"),
    ];
    let plan = planner(graph).plan(&changes, "main").await.unwrap();

    assert!(position(&plan, "Customer") < position(&plan, "Order"));
    assert!(position(&plan, "Order") < position(&plan, "Invoice"));
    assert_eq!(plan.execution_order().len(), 4);
    // interface-extends does not order entities.
    assert_eq!(plan.execution_order(), ["Customer", "Order", "Invoice", "Document"]);
    assert!(plan.diagnostics().cycle.is_none());

    let first_invoice_step = plan.steps().iter().position(|s| s.entity == "Invoice").unwrap();
    let last_order_step = plan.steps().iter().rposition(|s| s.entity == "Order").unwrap();
    assert!(last_order_step < first_invoice_step);
}

#[tokio::test]
async fn test_planning_is_idempotent() {
    let mut graph = MemoryGraph::new();
    graph.add_edge("Invoice", "link", "Order");
    let planner = planner(graph);
    let changes = vec![type_change("Invoice", "total"), pk_change("Order")];

    let first = planner.plan(&changes, "main").await.unwrap();
    let second = planner.plan(&changes, "main").await.unwrap();

    assert_eq!(first.steps(), second.steps());
    assert_eq!(first.rollback_steps(), second.rollback_steps());
    assert_eq!(first.execution_order(), second.execution_order());
    assert_ne!(first.id(), second.id());
}

#[tokio::test]
async fn test_rollback_mirrors_reversible_steps() {
    let changes = vec![
        pk_change("Order"),
        type_change("Order", "total"),
        field_removal("User", "email"),
    ];
    let plan = planner(MemoryGraph::new()).plan(&changes, "main").await.unwrap();

    let mut reversible: Vec<(usize, StepType)> = plan
        .steps()
        .iter()
        .enumerate()
        .filter(|(_, s)| s.rollback_script.is_some())
        .map(|(i, s)| (i, s.step_type))
        .collect();
    reversible.reverse();

    let rollback: Vec<(usize, StepType)> = plan
        .rollback_steps()
        .iter()
        .map(|s| (s.metadata["rollback_of"].as_u64().unwrap() as usize, s.step_type))
        .collect();
    assert_eq!(rollback, reversible);

    let removal = plan
        .steps()
        .iter()
        .find(|s| s.step_type == StepType::RemoveFields)
        .unwrap();
    assert_eq!(removal.metadata["irreversible"], serde_json::json!(true));
}

#[tokio::test]
async fn test_empty_input_is_completed() {
    let plan = planner(MemoryGraph::new()).plan(&[], "main").await.unwrap();

    assert_eq!(plan.status(), PlanStatus::Completed);
    assert!(plan.steps().is_empty());
    assert!(plan.execution_order().is_empty());
    assert_eq!(plan.estimated_duration_seconds(), 0);
    assert!(!plan.requires_downtime());
}

#[tokio::test]
async fn test_blank_branch_rejected() {
    let err = planner(MemoryGraph::new())
        .plan(&[pk_change("Order")], "  ")
        .await
        .unwrap_err();
    assert!(matches!(err, PlanError::InvalidInput(_)));
}

#[tokio::test]
async fn test_unknown_rule_contributes_no_steps() {
    let changes = vec![
        BreakingChange::entity("cardinality_change", Severity::Medium, "Order"),
        pk_change("Order"),
    ];
    let plan = planner(MemoryGraph::new()).plan(&changes, "main").await.unwrap();

    assert_eq!(plan.steps().len(), 4);
    let unknown = &plan.diagnostics().unknown_rules;
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].entity, "Order");
    assert_eq!(unknown[0].rule_id, "cardinality_change");
}

#[tokio::test]
async fn test_malformed_change_dropped() {
    let changes = vec![
        BreakingChange::new("data_type_change", Severity::High, ResourceType::Property, "total")
            .with_metadata("object_type", "Order"),
        pk_change("Order"),
    ];
    let plan = planner(MemoryGraph::new()).plan(&changes, "main").await.unwrap();

    assert_eq!(plan.diagnostics().dropped_changes.len(), 1);
    assert_eq!(plan.diagnostics().dropped_changes[0].index, 0);
    assert_eq!(plan.steps().len(), 4);
    assert_eq!(plan.breaking_changes().len(), 2);
}

#[tokio::test]
async fn test_unattributed_changes_stay_visible() {
    let orphan = BreakingChange::new("type_change", Severity::Medium, ResourceType::Property, "amount")
        .with_field("amount")
        .with_values("int", "bigint");
    let plan = planner(MemoryGraph::new())
        .plan(&[orphan, pk_change("Order")], "main")
        .await
        .unwrap();

    assert_eq!(plan.execution_order().last().map(String::as_str), Some(UNKNOWN_ENTITY));
    assert_eq!(plan.diagnostics().unattributed_changes, 1);
    assert_eq!(plan.steps_for_entity(UNKNOWN_ENTITY).count(), 3);
}

#[tokio::test]
async fn test_entity_named_unknown_is_ordered_like_any_other() {
    let mut graph = MemoryGraph::new();
    graph.add_entity("Order").add_entity("Unknown");
    graph.add_edge("Order", "link", "Unknown");

    let plan = planner(graph)
        .plan(&[pk_change("Order"), pk_change("Unknown")], "main")
        .await
        .unwrap();

    assert_eq!(plan.execution_order(), ["Unknown", "Order"]);
    assert_eq!(plan.diagnostics().unattributed_changes, 0);
    assert!(plan.diagnostics().is_clean());
}

#[tokio::test]
async fn test_unreachable_store_gives_partial_ordering() {
    let config = PlannerConfig::default().with_retry(RetryConfig::no_retry());
    let planner = MigrationPlanner::new(Arc::new(DownPort), config);
    let plan = planner
        .plan(&[pk_change("Order"), pk_change("Invoice")], "main")
        .await
        .unwrap();

    assert!(plan.diagnostics().ordering_partial);
    assert_eq!(plan.diagnostics().skipped.len(), 2);
    assert_eq!(plan.execution_order(), ["Order".to_string(), "Invoice".to_string()]);
    assert_eq!(plan.steps().len(), 8);
}

#[tokio::test]
async fn test_configured_strategies() {
    let config = PlannerConfig::default()
        .with_primary_key_strategy(PrimaryKeyStrategy::BackfillNullable)
        .with_required_field_strategy(RequiredFieldStrategy::SetDefaultValues);
    let planner = MigrationPlanner::new(Arc::new(MemoryGraph::new()), config);
    let plan = planner
        .plan(&[pk_change("Order"), field_removal("Order", "note")], "main")
        .await
        .unwrap();

    assert_eq!(
        step_types(plan.steps()),
        vec![
            StepType::AddNullableColumn,
            StepType::BackfillData,
            StepType::MakeRequiredAndSwitch,
            StepType::SetDefaultValues,
            StepType::RemoveFields,
        ]
    );
    // make-required-and-switch is followed by set-default-values, so the
    // two downtime steps land in separate windows.
    assert_eq!(plan.downtime_windows().len(), 2);
    assert_eq!(plan.total_downtime_seconds(), 60 + 30);
}

#[tokio::test]
async fn test_custom_strategy_replaces_default() {
    let planner = planner(MemoryGraph::new()).with_strategy(RuleKind::DataTypeChange, Arc::new(ManualReview));
    let plan = planner
        .plan(&[type_change("Order", "total"), type_change("Order", "tax")], "main")
        .await
        .unwrap();

    assert_eq!(plan.steps().len(), 1);
    assert!(plan.steps()[0].is_manual());
    assert!(plan.rollback_steps().is_empty());
}

#[tokio::test]
async fn test_plan_json_roundtrip_and_transition() {
    let plan = planner(MemoryGraph::new())
        .plan(&[pk_change("Order")], "release")
        .await
        .unwrap();

    let restored = MigrationPlan::from_json(&plan.to_json().unwrap()).unwrap();
    assert_eq!(restored, plan);

    let scheduled = plan.transition(PlanStatus::Scheduled).unwrap();
    assert_eq!(scheduled.status(), PlanStatus::Scheduled);
    assert!(scheduled.transition(PlanStatus::RolledBack).is_err());
}
