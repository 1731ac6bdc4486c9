//! ontoplan core.
//!
//! Impact analysis and migration planning for ontology schema changes.
//!
//! # Modules
//!
//! - [`analyzer`] - Dependency impact, cycles, critical paths, orphans
//! - [`planner`] - Grouping, ordering, step strategies, rollback, downtime
//! - [`port`] - Graph query port and retrying runner
//! - [`memory`] - In-memory graph store implementing the port
//! - [`cache`] - Memo cache for analyzer results
//! - [`config`] - Analyzer and planner configuration
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```ignore
//! use ontoplan_core::{MemoryGraph, MigrationPlanner, PlannerConfig};
//! use std::sync::Arc;
//!
//! let graph = Arc::new(MemoryGraph::new());
//! let planner = MigrationPlanner::new(graph, PlannerConfig::default());
//! let plan = planner.plan(&changes, "main").await?;
//! println!("{}", plan.to_json()?);
//! ```

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod error;
pub mod memory;
pub mod planner;
pub mod port;

pub use analyzer::DependencyAnalyzer;
pub use cache::{AnalysisCache, CacheStats};
pub use config::{
    AnalyzerConfig, OntoplanConfig, PlannerConfig, PrimaryKeyStrategy, RequiredFieldStrategy,
    RetryConfig, StepDurations,
};
pub use error::{Error, PlanError, QueryError};
pub use memory::{GraphSnapshot, MemoryGraph};
pub use planner::{MigrationPlanner, RuleKind, StepStrategy, StrategyRegistry};
pub use port::{Deadline, GraphQueryPort, QueryRunner};
