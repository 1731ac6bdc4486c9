//! Breaking-change records produced by the upstream rule engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity of a change or finding, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Cosmetic or fully compatible.
    Low,
    /// Needs attention but rarely breaks consumers.
    Medium,
    /// Likely to break dependents.
    High,
    /// Breaks dependents or destroys data.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Kind of schema resource a change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// An entity (object type) itself.
    Entity,
    /// A property owned by an entity.
    Property,
    /// A typed relation between entities.
    Relation,
    /// Anything else the rule engine reports.
    Other,
}

/// Predicted size of a change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactEstimate {
    /// Number of records expected to be touched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
    /// Expected duration of the data movement, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration_seconds: Option<u64>,
}

impl ImpactEstimate {
    /// Estimate from a row count.
    pub fn rows(affected_rows: u64) -> Self {
        Self {
            affected_rows: Some(affected_rows),
            estimated_duration_seconds: None,
        }
    }

    /// Estimate from a known duration.
    pub fn duration(seconds: u64) -> Self {
        Self {
            affected_rows: None,
            estimated_duration_seconds: Some(seconds),
        }
    }
}

/// A detected schema modification with likely impact on dependents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakingChange {
    /// Identifier of the rule that fired (selects the migration strategy).
    pub rule_id: String,
    /// Severity assigned by the rule engine.
    pub severity: Severity,
    /// Kind of resource affected.
    pub resource_type: ResourceType,
    /// Name of the affected resource.
    pub resource_name: String,
    /// Field affected, for property-level changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    /// Value before the change.
    #[serde(default)]
    pub old_value: serde_json::Value,
    /// Value after the change.
    #[serde(default)]
    pub new_value: serde_json::Value,
    /// Free-form details (`object_type`, `old_primary_key`, `new_primary_key`, `fields`, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Predicted size of the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_estimate: Option<ImpactEstimate>,
}

impl BreakingChange {
    /// Create a change with empty values and metadata.
    pub fn new(
        rule_id: impl Into<String>,
        severity: Severity,
        resource_type: ResourceType,
        resource_name: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity,
            resource_type,
            resource_name: resource_name.into(),
            field_name: None,
            old_value: serde_json::Value::Null,
            new_value: serde_json::Value::Null,
            metadata: BTreeMap::new(),
            impact_estimate: None,
        }
    }

    /// Create an entity-level change.
    pub fn entity(rule_id: impl Into<String>, severity: Severity, entity: impl Into<String>) -> Self {
        Self::new(rule_id, severity, ResourceType::Entity, entity)
    }

    /// Create a property-level change attributed to `object_type`.
    pub fn property(
        rule_id: impl Into<String>,
        severity: Severity,
        object_type: impl Into<String>,
        field_name: impl Into<String>,
    ) -> Self {
        let field_name = field_name.into();
        Self::new(rule_id, severity, ResourceType::Property, field_name.clone())
            .with_field(field_name)
            .with_metadata("object_type", object_type.into())
    }

    /// Set the affected field.
    pub fn with_field(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }

    /// Set the old and new values.
    pub fn with_values(
        mut self,
        old_value: impl Into<serde_json::Value>,
        new_value: impl Into<serde_json::Value>,
    ) -> Self {
        self.old_value = old_value.into();
        self.new_value = new_value.into();
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the impact estimate.
    pub fn with_impact(mut self, estimate: ImpactEstimate) -> Self {
        self.impact_estimate = Some(estimate);
        self
    }

    /// Get a metadata entry as a string, if it is one.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// Field names this change touches: `field_name` plus any names listed in `metadata["fields"]`.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        if let Some(field) = &self.field_name {
            names.push(field.clone());
        }
        if let Some(serde_json::Value::Array(items)) = self.metadata.get("fields") {
            for item in items {
                if let Some(name) = item.as_str() {
                    if !names.iter().any(|n| n == name) {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names
    }
}
