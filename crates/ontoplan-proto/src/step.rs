//! Migration steps and their backend-agnostic payloads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepType {
    CreateTempCollection,
    CopyWithTransformation,
    VerifyDataIntegrity,
    AtomicSwitch,
    AddNullableColumn,
    BackfillData,
    MakeRequiredAndSwitch,
    MakeFieldsNullable,
    DeprecationPeriod,
    RemoveFields,
    SetDefaultValues,
    CreateConversionFunction,
    ProgressiveConversion,
    VerifyConversion,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StepType::CreateTempCollection => "create-temp-collection",
            StepType::CopyWithTransformation => "copy-with-transformation",
            StepType::VerifyDataIntegrity => "verify-data-integrity",
            StepType::AtomicSwitch => "atomic-switch",
            StepType::AddNullableColumn => "add-nullable-column",
            StepType::BackfillData => "backfill-data",
            StepType::MakeRequiredAndSwitch => "make-required-and-switch",
            StepType::MakeFieldsNullable => "make-fields-nullable",
            StepType::DeprecationPeriod => "deprecation-period",
            StepType::RemoveFields => "remove-fields",
            StepType::SetDefaultValues => "set-default-values",
            StepType::CreateConversionFunction => "create-conversion-function",
            StepType::ProgressiveConversion => "progressive-conversion",
            StepType::VerifyConversion => "verify-conversion",
        };
        write!(f, "{}", name)
    }
}

/// A data check run by a verification step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityCheck {
    /// Source and target hold the same number of records.
    RecordCount,
    /// The key field is unique in the target.
    KeyUniqueness { field: String },
    /// The field is non-null for every record.
    NotNull { field: String },
    /// Every value of the field parses as the target type.
    TypeConformance { field: String, to_type: String },
}

/// Structured description of what a step does, independent of any backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StepScript {
    /// Create an empty collection shaped like `like`.
    CreateCollection { name: String, like: String },
    /// Drop a collection.
    DropCollection { name: String },
    /// Remove every record from a collection.
    TruncateCollection { name: String },
    /// Copy all records, re-keying from `old_key` to `new_key`.
    CopyRecords {
        from: String,
        to: String,
        old_key: String,
        new_key: String,
    },
    /// Run data checks between two collections.
    Verify {
        source: String,
        target: String,
        checks: Vec<IntegrityCheck>,
    },
    /// Atomically exchange two collections.
    SwapCollections { live: String, replacement: String },
    /// Add a field.
    AddField {
        collection: String,
        field: String,
        nullable: bool,
    },
    /// Drop fields.
    DropFields {
        collection: String,
        fields: Vec<String>,
    },
    /// Populate `field` from `source_field` in batches.
    Backfill {
        collection: String,
        field: String,
        source_field: String,
    },
    /// Make `field` required and use it as the primary key instead of `previous_key`.
    SwitchPrimaryKey {
        collection: String,
        field: String,
        previous_key: String,
    },
    /// Relax fields to nullable.
    SetNullable {
        collection: String,
        fields: Vec<String>,
    },
    /// Enforce fields as required.
    SetRequired {
        collection: String,
        fields: Vec<String>,
    },
    /// Fill null values with defaults.
    SetDefaults {
        collection: String,
        defaults: BTreeMap<String, serde_json::Value>,
    },
    /// Wait for a human decision before continuing.
    AwaitApproval { reason: String },
    /// Register a value conversion function and its reverse.
    RegisterConversion {
        name: String,
        reverse: String,
        from_type: String,
        to_type: String,
    },
    /// Remove conversion functions.
    DropConversion { names: Vec<String> },
    /// Convert a field in place, batch by batch.
    ConvertField {
        collection: String,
        field: String,
        conversion: String,
        to_type: String,
        resumable: bool,
    },
}

/// One step of a migration plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStep {
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Entity the step belongs to.
    pub entity: String,
    pub description: String,
    pub script: StepScript,
    pub estimated_duration_seconds: u64,
    pub can_parallel: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    pub requires_downtime: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downtime_duration_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_script: Option<StepScript>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl MigrationStep {
    /// Create an online, sequential step.
    pub fn new(
        step_type: StepType,
        entity: impl Into<String>,
        description: impl Into<String>,
        script: StepScript,
        estimated_duration_seconds: u64,
    ) -> Self {
        Self {
            step_type,
            entity: entity.into(),
            description: description.into(),
            script,
            estimated_duration_seconds,
            can_parallel: false,
            batch_size: None,
            requires_downtime: false,
            downtime_duration_seconds: None,
            rollback_script: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Run in parallel batches of `batch_size`.
    pub fn batched(mut self, batch_size: usize) -> Self {
        self.can_parallel = true;
        self.batch_size = Some(batch_size);
        self
    }

    /// Require downtime for `seconds`.
    pub fn with_downtime(mut self, seconds: u64) -> Self {
        self.requires_downtime = true;
        self.downtime_duration_seconds = Some(seconds);
        self
    }

    /// Attach a rollback payload.
    pub fn with_rollback(mut self, script: StepScript) -> Self {
        self.rollback_script = Some(script);
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether the step waits on a human.
    pub fn is_manual(&self) -> bool {
        self.metadata.get("manual").and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Downtime this step contributes to its window.
    pub fn downtime_seconds(&self) -> u64 {
        if !self.requires_downtime {
            return 0;
        }
        self.downtime_duration_seconds
            .unwrap_or(self.estimated_duration_seconds)
    }
}
