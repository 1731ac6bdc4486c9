//! Dependency analysis results.

use crate::change::Severity;
use serde::{Deserialize, Serialize};

/// A directed dependency: `source` depends on `target` through `relation_kind`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
    #[serde(alias = "relation")]
    pub relation_kind: String,
}

/// A scored path between two highly connected nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyPath {
    /// Node sequence, endpoints included.
    pub nodes: Vec<String>,
    /// Whether the score reaches the configured critical weight.
    pub is_critical: bool,
    /// `(degree(first) + degree(last)) / hops`.
    pub total_weight: f64,
}

impl DependencyPath {
    /// Number of edges traversed.
    pub fn hops(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }
}

/// Kind of semantic conflict found in the ontology graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    CircularDependency,
    OrphanedNode,
    CardinalityViolation,
    DanglingReference,
    TypeMismatch,
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictType::CircularDependency => write!(f, "CIRCULAR_DEPENDENCY"),
            ConflictType::OrphanedNode => write!(f, "ORPHANED_NODE"),
            ConflictType::CardinalityViolation => write!(f, "CARDINALITY_VIOLATION"),
            ConflictType::DanglingReference => write!(f, "DANGLING_REFERENCE"),
            ConflictType::TypeMismatch => write!(f, "TYPE_MISMATCH"),
        }
    }
}

/// How far a conflict reaches, by number of involved nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactScope {
    /// One or two nodes.
    Local,
    /// Up to ten nodes.
    Module,
    /// More than ten nodes.
    Global,
}

impl ImpactScope {
    /// Scope for a conflict touching `node_count` nodes.
    pub fn for_node_count(node_count: usize) -> Self {
        match node_count {
            0..=2 => ImpactScope::Local,
            3..=10 => ImpactScope::Module,
            _ => ImpactScope::Global,
        }
    }
}

/// A structural problem in the ontology graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticConflict {
    pub conflict_type: ConflictType,
    pub severity: Severity,
    pub affected_nodes: Vec<String>,
    pub description: String,
    pub suggested_resolution: String,
    pub impact_scope: ImpactScope,
}

/// Kind of change whose impact is being analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactKind {
    /// The entity is removed.
    Deletion,
    /// The entity's shape changes.
    Modification,
    /// The entity is renamed.
    Rename,
}

impl std::fmt::Display for ImpactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImpactKind::Deletion => write!(f, "deletion"),
            ImpactKind::Modification => write!(f, "modification"),
            ImpactKind::Rename => write!(f, "rename"),
        }
    }
}

/// Structured recommendation derived from impact counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Recommendation {
    /// Nothing depends on the entity.
    NoDependents,
    /// Migrate or detach dependents before deleting.
    MigrateDependentsFirst { count: usize },
    /// Check each direct dependent against the new shape.
    ValidateDependentCompatibility { count: usize },
    /// Rewrite references held by dependents.
    UpdateReferences { count: usize },
    /// Owners of critical dependents must sign off.
    NotifyCriticalOwners { count: usize },
    /// Roll out in stages because many entities are affected.
    StagedRollout { affected: usize },
}

/// A branch of an analysis that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedBranch {
    /// What was being queried (relation kind, entity, node pair).
    pub branch: String,
    /// Why it was skipped.
    pub reason: String,
}

/// A binding value that could not be parsed and was replaced by a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFallback {
    pub variable: String,
    pub raw: String,
}

/// A configured cap that truncated the search space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitApplied {
    pub limit: String,
    pub cap: usize,
    pub observed: usize,
}

/// Degradation markers attached to every analysis result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Some branch failed or was skipped; the result may be incomplete.
    pub partial: bool,
    /// The analysis deadline expired before all branches ran.
    pub truncated: bool,
    pub skipped: Vec<SkippedBranch>,
    pub parse_fallbacks: Vec<ParseFallback>,
    pub limits_applied: Vec<LimitApplied>,
}

impl Diagnostics {
    /// Record a skipped branch and mark the result partial.
    pub fn skip(&mut self, branch: impl Into<String>, reason: impl Into<String>) {
        self.partial = true;
        self.skipped.push(SkippedBranch {
            branch: branch.into(),
            reason: reason.into(),
        });
    }

    /// Record that the deadline cut the analysis short.
    pub fn truncate(&mut self, branch: impl Into<String>) {
        self.truncated = true;
        self.skip(branch, "analysis deadline exceeded");
    }

    /// Record a parse fallback.
    pub fn parse_fallback(&mut self, variable: impl Into<String>, raw: impl Into<String>) {
        self.parse_fallbacks.push(ParseFallback {
            variable: variable.into(),
            raw: raw.into(),
        });
    }

    /// Record a cap that was reached.
    pub fn limit(&mut self, limit: impl Into<String>, cap: usize, observed: usize) {
        self.limits_applied.push(LimitApplied {
            limit: limit.into(),
            cap,
            observed,
        });
    }

    /// Fold another set of diagnostics into this one.
    pub fn merge(&mut self, other: Diagnostics) {
        self.partial |= other.partial;
        self.truncated |= other.truncated;
        self.skipped.extend(other.skipped);
        self.parse_fallbacks.extend(other.parse_fallbacks);
        self.limits_applied.extend(other.limits_applied);
    }

    /// True when nothing was skipped, truncated or defaulted.
    pub fn is_clean(&self) -> bool {
        !self.partial && !self.truncated && self.parse_fallbacks.is_empty()
    }
}

/// An analysis value together with its degradation markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome<T> {
    pub value: T,
    pub diagnostics: Diagnostics,
}

impl<T> AnalysisOutcome<T> {
    /// Wrap a value.
    pub fn new(value: T, diagnostics: Diagnostics) -> Self {
        Self { value, diagnostics }
    }

    /// Whether the value may be incomplete.
    pub fn is_partial(&self) -> bool {
        self.diagnostics.partial
    }
}

/// Entities affected by a change to one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactReport {
    pub entity: String,
    pub change_kind: ImpactKind,
    pub direct_dependents: Vec<String>,
    pub transitive_dependents: Vec<String>,
    pub critical_dependents: Vec<String>,
    /// Size of the union of direct and transitive dependents.
    pub total_affected: usize,
    pub risk: Severity,
    pub recommendations: Vec<Recommendation>,
    pub diagnostics: Diagnostics,
}

/// Combined structural health of the ontology graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub cycles: Vec<SemanticConflict>,
    pub orphans: Vec<SemanticConflict>,
    pub dangling_references: Vec<SemanticConflict>,
    pub critical_paths: Vec<DependencyPath>,
    pub diagnostics: Diagnostics,
}

impl HealthReport {
    /// Total number of conflicts across all checks.
    pub fn conflict_count(&self) -> usize {
        self.cycles.len() + self.orphans.len() + self.dangling_references.len()
    }
}
