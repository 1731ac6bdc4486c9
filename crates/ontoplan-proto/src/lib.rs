//! ontoplan protocol types.
//!
//! This crate defines the data exchanged between the rule engine, the
//! planner and the execution engine, plus the graph query IR used to talk to
//! ontology stores.
//!
//! # Modules
//!
//! - [`change`] - Breaking-change records (planner input)
//! - [`query`] - Query IR for ontology graph queries
//! - [`binding`] - Variable bindings returned by queries
//! - [`sparql`] - SPARQL rendering of the query IR
//! - [`analysis`] - Impact reports, conflicts, paths and diagnostics
//! - [`step`] - Migration steps and their structured payloads
//! - [`plan`] - The immutable migration plan (planner output)
//! - [`error`] - Protocol error types
//!
//! # Serialization
//!
//! Every type derives serde's `Serialize` and `Deserialize` and is exchanged
//! as JSON:
//!
//! ```ignore
//! use ontoplan_proto::MigrationPlan;
//!
//! let json = plan.to_json()?;
//! let restored = MigrationPlan::from_json(&json)?;
//! ```

pub mod analysis;
pub mod binding;
pub mod change;
pub mod error;
pub mod plan;
pub mod query;
pub mod sparql;
pub mod step;

pub use error::Error;

// Re-export commonly used types at crate root
pub use analysis::{
    AnalysisOutcome, ConflictType, DependencyEdge, DependencyPath, Diagnostics, HealthReport,
    ImpactKind, ImpactReport, ImpactScope, LimitApplied, ParseFallback, Recommendation,
    SemanticConflict, SkippedBranch,
};
pub use binding::{binding_str, Binding, BindingValue};
pub use change::{BreakingChange, ImpactEstimate, ResourceType, Severity};
pub use plan::{
    generate_plan_id, CycleDiagnostic, DowntimeWindow, DroppedChange, MigrationPlan,
    PlanDiagnostics, PlanParts, PlanStatus, UnknownRule,
};
pub use query::{GraphQuery, GroupCount, Pattern, QueryFilter, RelationPath, Term};
pub use step::{IntegrityCheck, MigrationStep, StepScript, StepType};

/// Sentinel entity for changes that name no owning entity.
pub const UNKNOWN_ENTITY: &str = "Unknown";
