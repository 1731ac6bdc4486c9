//! Subcommands and their execution.

use crate::formatter::Formatter;
use clap::{Subcommand, ValueEnum};
use ontoplan_core::{DependencyAnalyzer, Error, GraphQueryPort, MigrationPlanner, OntoplanConfig};
use ontoplan_proto::{BreakingChange, ImpactKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show what depends on an entity
    Impact {
        /// Entity identifier
        entity: String,

        /// Kind of change being considered
        #[arg(long, value_enum, default_value = "modification")]
        kind: ChangeKind,
    },

    /// List dependency cycles
    Cycles,

    /// Rank paths between highly connected entities
    CriticalPaths {
        /// Maximum number of paths (defaults to the configured value)
        #[arg(long)]
        max_paths: Option<usize>,
    },

    /// List entities without any relation
    Orphans,

    /// List relations pointing at undeclared entities
    Dangling,

    /// Run every structural check
    Health,

    /// Build a migration plan from a list of breaking changes
    Plan {
        /// Breaking changes (JSON array)
        #[arg(long)]
        changes: PathBuf,

        /// Branch the plan targets
        #[arg(long, default_value = "main")]
        branch: String,
    },
}

/// Change kind accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChangeKind {
    Deletion,
    Modification,
    Rename,
}

impl From<ChangeKind> for ImpactKind {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Deletion => ImpactKind::Deletion,
            ChangeKind::Modification => ImpactKind::Modification,
            ChangeKind::Rename => ImpactKind::Rename,
        }
    }
}

/// Read a JSON array of breaking changes.
pub fn load_changes(path: &Path) -> Result<Vec<BreakingChange>, Error> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Run a command against a graph and render its result.
pub async fn execute(
    command: &Command,
    port: Arc<dyn GraphQueryPort>,
    config: &OntoplanConfig,
    formatter: &dyn Formatter,
) -> Result<String, Error> {
    let analyzer = DependencyAnalyzer::new(port.clone(), config.analyzer.clone());

    match command {
        Command::Impact { entity, kind } => {
            let report = analyzer.analyze_change_impact(entity, (*kind).into()).await;
            formatter.format_impact(&report)
        }
        Command::Cycles => {
            let outcome = analyzer.detect_circular_dependencies().await;
            formatter.format_conflicts(&outcome)
        }
        Command::CriticalPaths { max_paths } => {
            let max_paths = max_paths.unwrap_or(config.analyzer.default_critical_paths);
            let outcome = analyzer.find_critical_paths(max_paths).await;
            formatter.format_paths(&outcome)
        }
        Command::Orphans => {
            let outcome = analyzer.analyze_orphaned_entities().await;
            formatter.format_conflicts(&outcome)
        }
        Command::Dangling => {
            let outcome = analyzer.detect_dangling_references().await;
            formatter.format_conflicts(&outcome)
        }
        Command::Health => {
            let report = analyzer.analyze_health().await;
            formatter.format_health(&report)
        }
        Command::Plan { changes, branch } => {
            let changes = load_changes(changes)?;
            info!(changes = changes.len(), branch = %branch, "Planning migration");
            let planner = MigrationPlanner::new(port, config.planner.clone());
            let plan = planner.plan(&changes, branch).await?;
            formatter.format_plan(&plan)
        }
    }
}
