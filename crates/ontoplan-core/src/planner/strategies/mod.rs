//! Built-in step strategies.

mod data_type;
mod primary_key;
mod required_field;

pub use data_type::ProgressiveConversion;
pub use primary_key::{BackfillNullable, CopyThenSwitch};
pub use required_field::{MakeNullableFirst, SetDefaultValues};

use crate::config::PlannerConfig;
use ontoplan_proto::BreakingChange;

/// Duration of a data movement step.
///
/// Uses the change's own duration estimate, then its row estimate at the
/// configured throughput, then `default`.
pub(crate) fn data_duration(change: &BreakingChange, config: &PlannerConfig, default: u64) -> u64 {
    let Some(estimate) = &change.impact_estimate else {
        return default;
    };
    if let Some(seconds) = estimate.estimated_duration_seconds {
        return seconds;
    }
    match estimate.affected_rows {
        Some(rows) if config.rows_per_second > 0 => rows.div_ceil(config.rows_per_second),
        _ => default,
    }
}

/// Temporary collection name for an entity.
pub(crate) fn temp_collection(entity: &str, config: &PlannerConfig) -> String {
    format!("{}{}", entity, config.temp_collection_suffix)
}

/// Field names across all changes, first occurrence wins.
pub(crate) fn collect_fields(changes: &[BreakingChange]) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for change in changes {
        for field in change.field_names() {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
    }
    fields
}

/// A string from metadata, then from a value, then a fallback.
pub(crate) fn pick(change: &BreakingChange, key: &str, value: &serde_json::Value, fallback: &str) -> String {
    change
        .metadata_str(key)
        .or_else(|| value.as_str())
        .unwrap_or(fallback)
        .to_string()
}
