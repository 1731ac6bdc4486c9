//! Rule kinds and the strategy registry.

use crate::config::{PlannerConfig, PrimaryKeyStrategy, RequiredFieldStrategy};
use crate::planner::strategies::{
    BackfillNullable, CopyThenSwitch, MakeNullableFirst, ProgressiveConversion, SetDefaultValues,
};
use ontoplan_proto::{BreakingChange, MigrationStep};
use std::fmt;
use std::sync::Arc;

/// Kind of breaking change, parsed from a rule id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleKind {
    PrimaryKeyChange,
    RequiredFieldRemoval,
    DataTypeChange,
}

impl RuleKind {
    /// Parse a rule id. Case and `-`/`_` are ignored.
    pub fn parse(rule_id: &str) -> Option<RuleKind> {
        let normalized = rule_id.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "primary_key_change" | "pk_change" => Some(RuleKind::PrimaryKeyChange),
            "required_field_removal" | "required_field_removed" => {
                Some(RuleKind::RequiredFieldRemoval)
            }
            "data_type_change" | "type_change" => Some(RuleKind::DataTypeChange),
            _ => None,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::PrimaryKeyChange => write!(f, "primary_key_change"),
            RuleKind::RequiredFieldRemoval => write!(f, "required_field_removal"),
            RuleKind::DataTypeChange => write!(f, "data_type_change"),
        }
    }
}

/// Turns the breaking changes of one kind on one entity into ordered steps.
pub trait StepStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Synthesize steps for `changes`, all of one rule kind and owned by `entity`.
    fn synthesize(
        &self,
        entity: &str,
        changes: &[BreakingChange],
        config: &PlannerConfig,
    ) -> Vec<MigrationStep>;
}

/// One strategy per rule kind.
#[derive(Clone)]
pub struct StrategyRegistry {
    primary_key: Arc<dyn StepStrategy>,
    required_field: Arc<dyn StepStrategy>,
    data_type: Arc<dyn StepStrategy>,
}

impl StrategyRegistry {
    /// Registry with the strategies selected in the configuration.
    pub fn from_config(config: &PlannerConfig) -> Self {
        let primary_key: Arc<dyn StepStrategy> = match config.primary_key_strategy {
            PrimaryKeyStrategy::CopyThenSwitch => Arc::new(CopyThenSwitch),
            PrimaryKeyStrategy::BackfillNullable => Arc::new(BackfillNullable),
        };
        let required_field: Arc<dyn StepStrategy> = match config.required_field_strategy {
            RequiredFieldStrategy::MakeNullableFirst => Arc::new(MakeNullableFirst),
            RequiredFieldStrategy::SetDefaultValues => Arc::new(SetDefaultValues),
        };
        Self {
            primary_key,
            required_field,
            data_type: Arc::new(ProgressiveConversion),
        }
    }

    /// Replace the strategy for one rule kind.
    pub fn with_strategy(mut self, kind: RuleKind, strategy: Arc<dyn StepStrategy>) -> Self {
        match kind {
            RuleKind::PrimaryKeyChange => self.primary_key = strategy,
            RuleKind::RequiredFieldRemoval => self.required_field = strategy,
            RuleKind::DataTypeChange => self.data_type = strategy,
        }
        self
    }

    /// Strategy for a rule kind.
    pub fn get(&self, kind: RuleKind) -> &dyn StepStrategy {
        match kind {
            RuleKind::PrimaryKeyChange => self.primary_key.as_ref(),
            RuleKind::RequiredFieldRemoval => self.required_field.as_ref(),
            RuleKind::DataTypeChange => self.data_type.as_ref(),
        }
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::from_config(&PlannerConfig::default())
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("primary_key", &self.primary_key.name())
            .field("required_field", &self.required_field.name())
            .field("data_type", &self.data_type.name())
            .finish()
    }
}
