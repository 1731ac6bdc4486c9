//! Primary-key change strategies.

use super::{data_duration, pick, temp_collection};
use crate::config::PlannerConfig;
use crate::planner::strategy::StepStrategy;
use ontoplan_proto::{BreakingChange, IntegrityCheck, MigrationStep, StepScript, StepType};
use tracing::debug;

/// Old and new key of a primary-key change.
fn keys(change: &BreakingChange) -> (String, String) {
    let old_key = pick(change, "old_primary_key", &change.old_value, "id");
    let fallback = change.field_name.as_deref().unwrap_or("id");
    let new_key = pick(change, "new_primary_key", &change.new_value, fallback);
    (old_key, new_key)
}

/// Fold every key change of one entity into a single move from the first
/// old key to the last new key. The last change supplies the estimate.
fn collapse<'a>(entity: &str, changes: &'a [BreakingChange]) -> Option<(&'a BreakingChange, String, String)> {
    let (first, last) = (changes.first()?, changes.last()?);
    if changes.len() > 1 {
        debug!(entity, changes = changes.len(), "Collapsing primary-key changes");
    }
    let (old_key, _) = keys(first);
    let (_, new_key) = keys(last);
    Some((last, old_key, new_key))
}

/// Copy into a re-keyed temporary collection, verify, then swap.
///
/// The swap is the only step that needs downtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyThenSwitch;

impl StepStrategy for CopyThenSwitch {
    fn name(&self) -> &'static str {
        "copy-then-switch"
    }

    fn synthesize(&self, entity: &str, changes: &[BreakingChange], config: &PlannerConfig) -> Vec<MigrationStep> {
        let Some((change, old_key, new_key)) = collapse(entity, changes) else {
            return Vec::new();
        };
        let durations = &config.durations;
        let temp = temp_collection(entity, config);
        let mut steps = Vec::with_capacity(4);

        steps.push(
            MigrationStep::new(
                StepType::CreateTempCollection,
                entity,
                format!("Create temporary collection {temp} for {entity}"),
                StepScript::CreateCollection {
                    name: temp.clone(),
                    like: entity.to_string(),
                },
                durations.create_temp_collection,
            )
            .with_rollback(StepScript::DropCollection { name: temp.clone() }),
        );

        steps.push(
            MigrationStep::new(
                StepType::CopyWithTransformation,
                entity,
                format!("Copy {entity} into {temp} keyed by {new_key} instead of {old_key}"),
                StepScript::CopyRecords {
                    from: entity.to_string(),
                    to: temp.clone(),
                    old_key: old_key.clone(),
                    new_key: new_key.clone(),
                },
                data_duration(change, config, durations.copy_with_transformation),
            )
            .with_rollback(StepScript::TruncateCollection { name: temp.clone() }),
        );

        steps.push(MigrationStep::new(
            StepType::VerifyDataIntegrity,
            entity,
            format!("Verify {temp} against {entity}"),
            StepScript::Verify {
                source: entity.to_string(),
                target: temp.clone(),
                checks: vec![
                    IntegrityCheck::RecordCount,
                    IntegrityCheck::KeyUniqueness {
                        field: new_key.clone(),
                    },
                ],
            },
            durations.verify_data_integrity,
        ));

        let swap = StepScript::SwapCollections {
            live: entity.to_string(),
            replacement: temp.clone(),
        };
        steps.push(
            MigrationStep::new(
                StepType::AtomicSwitch,
                entity,
                format!("Switch {entity} to {temp}"),
                swap.clone(),
                durations.atomic_switch,
            )
            .with_downtime(durations.atomic_switch)
            .with_rollback(swap)
            .with_metadata("previous_key", old_key),
        );
        steps
    }
}

/// Add the new key as a nullable column, backfill it, then enforce and switch.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackfillNullable;

impl StepStrategy for BackfillNullable {
    fn name(&self) -> &'static str {
        "backfill-nullable"
    }

    fn synthesize(&self, entity: &str, changes: &[BreakingChange], config: &PlannerConfig) -> Vec<MigrationStep> {
        let Some((change, old_key, new_key)) = collapse(entity, changes) else {
            return Vec::new();
        };
        let durations = &config.durations;
        let mut steps = Vec::with_capacity(3);

        steps.push(
            MigrationStep::new(
                StepType::AddNullableColumn,
                entity,
                format!("Add nullable column {new_key} to {entity}"),
                StepScript::AddField {
                    collection: entity.to_string(),
                    field: new_key.clone(),
                    nullable: true,
                },
                durations.add_nullable_column,
            )
            .with_rollback(StepScript::DropFields {
                collection: entity.to_string(),
                fields: vec![new_key.clone()],
            }),
        );

        steps.push(
            MigrationStep::new(
                StepType::BackfillData,
                entity,
                format!("Backfill {entity}.{new_key} from {old_key}"),
                StepScript::Backfill {
                    collection: entity.to_string(),
                    field: new_key.clone(),
                    source_field: old_key.clone(),
                },
                data_duration(change, config, durations.backfill_data),
            )
            .batched(config.default_batch_size),
        );

        steps.push(
            MigrationStep::new(
                StepType::MakeRequiredAndSwitch,
                entity,
                format!("Make {entity}.{new_key} required and use it as primary key"),
                StepScript::SwitchPrimaryKey {
                    collection: entity.to_string(),
                    field: new_key.clone(),
                    previous_key: old_key.clone(),
                },
                durations.make_required_and_switch,
            )
            .with_downtime(durations.make_required_and_switch)
            .with_rollback(StepScript::SwitchPrimaryKey {
                collection: entity.to_string(),
                field: old_key,
                previous_key: new_key,
            }),
        );
        steps
    }
}
