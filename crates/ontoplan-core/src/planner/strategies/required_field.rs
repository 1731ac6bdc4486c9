//! Required-field removal strategies.
//!
//! Both strategies handle every removed field of an entity in one pass.

use super::collect_fields;
use crate::config::PlannerConfig;
use crate::planner::strategy::StepStrategy;
use ontoplan_proto::{BreakingChange, MigrationStep, StepScript, StepType};
use serde_json::Value;
use std::collections::BTreeMap;

fn remove_fields(entity: &str, fields: &[String], config: &PlannerConfig) -> MigrationStep {
    MigrationStep::new(
        StepType::RemoveFields,
        entity,
        format!("Remove {} from {}", fields.join(", "), entity),
        StepScript::DropFields {
            collection: entity.to_string(),
            fields: fields.to_vec(),
        },
        config.durations.remove_fields,
    )
    .with_metadata("irreversible", true)
}

/// Relax the fields to nullable, wait for consumers to stop writing them,
/// then drop them.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeNullableFirst;

impl StepStrategy for MakeNullableFirst {
    fn name(&self) -> &'static str {
        "make-nullable-first"
    }

    fn synthesize(&self, entity: &str, changes: &[BreakingChange], config: &PlannerConfig) -> Vec<MigrationStep> {
        let fields = collect_fields(changes);
        if fields.is_empty() {
            return Vec::new();
        }

        vec![
            MigrationStep::new(
                StepType::MakeFieldsNullable,
                entity,
                format!("Make {} nullable on {}", fields.join(", "), entity),
                StepScript::SetNullable {
                    collection: entity.to_string(),
                    fields: fields.clone(),
                },
                config.durations.make_fields_nullable,
            )
            .with_rollback(StepScript::SetRequired {
                collection: entity.to_string(),
                fields: fields.clone(),
            }),
            MigrationStep::new(
                StepType::DeprecationPeriod,
                entity,
                format!("Wait until no consumer writes {} on {}", fields.join(", "), entity),
                StepScript::AwaitApproval {
                    reason: format!("confirm consumers of {entity} no longer use the removed fields"),
                },
                0,
            )
            .with_metadata("manual", true),
            remove_fields(entity, &fields, config),
        ]
    }
}

/// Fill every removed field with a default, then drop the fields offline.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetDefaultValues;

impl StepStrategy for SetDefaultValues {
    fn name(&self) -> &'static str {
        "set-default-values"
    }

    fn synthesize(&self, entity: &str, changes: &[BreakingChange], config: &PlannerConfig) -> Vec<MigrationStep> {
        let fields = collect_fields(changes);
        if fields.is_empty() {
            return Vec::new();
        }

        let mut defaults = BTreeMap::new();
        for field in &fields {
            defaults.insert(field.clone(), default_for(changes, field));
        }

        vec![
            MigrationStep::new(
                StepType::SetDefaultValues,
                entity,
                format!("Set default values for {} on {}", fields.join(", "), entity),
                StepScript::SetDefaults {
                    collection: entity.to_string(),
                    defaults,
                },
                config.durations.set_default_values,
            )
            .batched(config.default_batch_size),
            remove_fields(entity, &fields, config).with_downtime(config.durations.remove_fields),
        ]
    }
}

/// Default for `field`: `metadata.default_values[field]`, then
/// `metadata.default_value` on the change naming the field, else null.
fn default_for(changes: &[BreakingChange], field: &str) -> Value {
    for change in changes {
        if let Some(Value::Object(values)) = change.metadata.get("default_values") {
            if let Some(value) = values.get(field) {
                return value.clone();
            }
        }
    }
    changes
        .iter()
        .filter(|c| c.field_name.as_deref() == Some(field))
        .find_map(|c| c.metadata.get("default_value").cloned())
        .unwrap_or(Value::Null)
}
