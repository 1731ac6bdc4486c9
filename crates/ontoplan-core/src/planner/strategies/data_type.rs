//! Data-type change strategy.

use super::{data_duration, pick};
use crate::config::PlannerConfig;
use crate::planner::strategy::StepStrategy;
use ontoplan_proto::{BreakingChange, IntegrityCheck, MigrationStep, StepScript, StepType};

/// Register a conversion, convert the field batch by batch, then verify.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressiveConversion;

fn conversion_name(entity: &str, field: &str, from: &str, to: &str) -> String {
    let raw = format!("convert_{entity}_{field}_{from}_to_{to}");
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

impl StepStrategy for ProgressiveConversion {
    fn name(&self) -> &'static str {
        "progressive-conversion"
    }

    fn synthesize(&self, entity: &str, changes: &[BreakingChange], config: &PlannerConfig) -> Vec<MigrationStep> {
        let durations = &config.durations;
        let mut steps = Vec::with_capacity(changes.len() * 3);

        for change in changes {
            let Some(field) = change.field_name.clone() else {
                continue;
            };
            let from_type = pick(change, "old_type", &change.old_value, "unknown");
            let to_type = pick(change, "new_type", &change.new_value, "unknown");
            let conversion = conversion_name(entity, &field, &from_type, &to_type);
            let reverse = conversion_name(entity, &field, &to_type, &from_type);

            steps.push(
                MigrationStep::new(
                    StepType::CreateConversionFunction,
                    entity,
                    format!("Create conversion {conversion} ({from_type} -> {to_type})"),
                    StepScript::RegisterConversion {
                        name: conversion.clone(),
                        reverse: reverse.clone(),
                        from_type: from_type.clone(),
                        to_type: to_type.clone(),
                    },
                    durations.create_conversion_function,
                )
                .with_rollback(StepScript::DropConversion {
                    names: vec![conversion.clone(), reverse.clone()],
                }),
            );

            steps.push(
                MigrationStep::new(
                    StepType::ProgressiveConversion,
                    entity,
                    format!("Convert {entity}.{field} to {to_type}"),
                    StepScript::ConvertField {
                        collection: entity.to_string(),
                        field: field.clone(),
                        conversion: conversion.clone(),
                        to_type: to_type.clone(),
                        resumable: true,
                    },
                    data_duration(change, config, durations.progressive_conversion),
                )
                .batched(config.default_batch_size)
                .with_metadata("resumable", true)
                .with_rollback(StepScript::ConvertField {
                    collection: entity.to_string(),
                    field: field.clone(),
                    conversion: reverse,
                    to_type: from_type,
                    resumable: true,
                }),
            );

            steps.push(MigrationStep::new(
                StepType::VerifyConversion,
                entity,
                format!("Verify {entity}.{field} values are {to_type}"),
                StepScript::Verify {
                    source: entity.to_string(),
                    target: entity.to_string(),
                    checks: vec![IntegrityCheck::TypeConformance { field, to_type }],
                },
                durations.verify_conversion,
            ));
        }
        steps
    }
}
