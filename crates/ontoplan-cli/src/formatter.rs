//! Output formatters for analysis results and plans.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use ontoplan_core::Error;
use ontoplan_proto::{
    AnalysisOutcome, DependencyPath, Diagnostics, HealthReport, ImpactReport, MigrationPlan,
    PlanDiagnostics, Recommendation, SemanticConflict,
};
use serde::Serialize;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format an impact report.
    fn format_impact(&self, report: &ImpactReport) -> Result<String, Error>;

    /// Format cycle, orphan or dangling-reference conflicts.
    fn format_conflicts(&self, outcome: &AnalysisOutcome<Vec<SemanticConflict>>) -> Result<String, Error>;

    /// Format ranked dependency paths.
    fn format_paths(&self, outcome: &AnalysisOutcome<Vec<DependencyPath>>) -> Result<String, Error>;

    /// Format a health report.
    fn format_health(&self, report: &HealthReport) -> Result<String, Error>;

    /// Format a migration plan.
    fn format_plan(&self, plan: &MigrationPlan) -> Result<String, Error>;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_impact(&self, report: &ImpactReport) -> Result<String, Error> {
        let mut table = Table::new();
        table.set_header(vec!["Dependent", "Kind", "Critical"]);
        for entity in &report.direct_dependents {
            let critical = report.critical_dependents.contains(entity);
            table.add_row(vec![Cell::new(entity), Cell::new("direct"), Cell::new(yes_no(critical))]);
        }
        for entity in &report.transitive_dependents {
            table.add_row(vec![Cell::new(entity), Cell::new("transitive"), Cell::new("")]);
        }

        let mut output = format!(
            "{} of {}: {} affected, risk {}\n",
            report.change_kind, report.entity, report.total_affected, report.risk
        );
        if report.total_affected > 0 {
            output.push_str(&table.to_string());
            output.push('\n');
        }
        for recommendation in &report.recommendations {
            output.push_str(&format!("- {}\n", describe(recommendation)));
        }
        output.push_str(&diagnostics_footer(&report.diagnostics));
        Ok(output.trim_end().to_string())
    }

    fn format_conflicts(&self, outcome: &AnalysisOutcome<Vec<SemanticConflict>>) -> Result<String, Error> {
        let mut output = conflict_table(&outcome.value);
        output.push('\n');
        output.push_str(&diagnostics_footer(&outcome.diagnostics));
        Ok(output.trim_end().to_string())
    }

    fn format_paths(&self, outcome: &AnalysisOutcome<Vec<DependencyPath>>) -> Result<String, Error> {
        let mut output = path_table(&outcome.value);
        output.push('\n');
        output.push_str(&diagnostics_footer(&outcome.diagnostics));
        Ok(output.trim_end().to_string())
    }

    fn format_health(&self, report: &HealthReport) -> Result<String, Error> {
        let count = report.conflict_count();
        let mut output = format!("{} conflict{}\n", count, if count == 1 { "" } else { "s" });

        for (title, conflicts) in [
            ("Cycles", &report.cycles),
            ("Orphans", &report.orphans),
            ("Dangling references", &report.dangling_references),
        ] {
            if conflicts.is_empty() {
                continue;
            }
            output.push_str(&format!("\n{}\n{}\n", title, conflict_table(conflicts)));
        }
        if !report.critical_paths.is_empty() {
            output.push_str(&format!("\nCritical paths\n{}\n", path_table(&report.critical_paths)));
        }
        output.push_str(&diagnostics_footer(&report.diagnostics));
        Ok(output.trim_end().to_string())
    }

    fn format_plan(&self, plan: &MigrationPlan) -> Result<String, Error> {
        let mut output = format!(
            "Plan {} for {} ({}): {} steps, ~{}s",
            plan.id(),
            plan.target_branch(),
            plan.status(),
            plan.steps().len(),
            plan.estimated_duration_seconds()
        );
        if plan.requires_downtime() {
            output.push_str(&format!(", {}s downtime", plan.total_downtime_seconds()));
        }
        output.push('\n');

        if !plan.execution_order().is_empty() {
            output.push_str(&format!("Order: {}\n", plan.execution_order().join(" -> ")));
        }

        if !plan.steps().is_empty() {
            let mut table = Table::new();
            table.set_header(vec!["#", "Entity", "Step", "Seconds", "Downtime", "Description"]);
            for (index, step) in plan.steps().iter().enumerate() {
                let downtime = if step.requires_downtime {
                    step.downtime_seconds().to_string()
                } else {
                    String::new()
                };
                table.add_row(vec![
                    Cell::new(index),
                    Cell::new(&step.entity),
                    Cell::new(step.step_type),
                    Cell::new(step.estimated_duration_seconds),
                    Cell::new(downtime),
                    Cell::new(&step.description),
                ]);
            }
            output.push_str(&table.to_string());
            output.push('\n');
        }

        for window in plan.downtime_windows() {
            output.push_str(&format!(
                "Downtime window: steps {}-{}, {}s\n",
                window.start_step, window.end_step, window.duration
            ));
        }
        output.push_str(&format!("Rollback steps: {}\n", plan.rollback_steps().len()));
        output.push_str(&plan_footer(plan.diagnostics()));
        Ok(output.trim_end().to_string())
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl JsonFormatter {
    fn render<T: Serialize>(value: &T) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(value)?)
    }
}

impl Formatter for JsonFormatter {
    fn format_impact(&self, report: &ImpactReport) -> Result<String, Error> {
        Self::render(report)
    }

    fn format_conflicts(&self, outcome: &AnalysisOutcome<Vec<SemanticConflict>>) -> Result<String, Error> {
        Self::render(outcome)
    }

    fn format_paths(&self, outcome: &AnalysisOutcome<Vec<DependencyPath>>) -> Result<String, Error> {
        Self::render(outcome)
    }

    fn format_health(&self, report: &HealthReport) -> Result<String, Error> {
        Self::render(report)
    }

    fn format_plan(&self, plan: &MigrationPlan) -> Result<String, Error> {
        Self::render(plan)
    }
}

fn conflict_table(conflicts: &[SemanticConflict]) -> String {
    if conflicts.is_empty() {
        return "No conflicts".to_string();
    }
    let mut table = Table::new();
    table.set_header(vec!["Type", "Severity", "Nodes", "Description"]);
    for conflict in conflicts {
        table.add_row(vec![
            Cell::new(conflict.conflict_type),
            Cell::new(conflict.severity),
            Cell::new(conflict.affected_nodes.join(", ")),
            Cell::new(&conflict.description),
        ]);
    }
    table.to_string()
}

fn path_table(paths: &[DependencyPath]) -> String {
    if paths.is_empty() {
        return "No paths".to_string();
    }
    let mut table = Table::new();
    table.set_header(vec!["Path", "Hops", "Score", "Critical"]);
    for path in paths {
        table.add_row(vec![
            Cell::new(path.nodes.join(" -> ")),
            Cell::new(path.hops()),
            Cell::new(format!("{:.2}", path.total_weight)),
            Cell::new(yes_no(path.is_critical)),
        ]);
    }
    table.to_string()
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        ""
    }
}

fn describe(recommendation: &Recommendation) -> String {
    match recommendation {
        Recommendation::NoDependents => "No dependents; the change is safe to apply".to_string(),
        Recommendation::MigrateDependentsFirst { count } => {
            format!("Migrate or detach {} direct dependents first", count)
        }
        Recommendation::ValidateDependentCompatibility { count } => {
            format!("Validate {} direct dependents against the new shape", count)
        }
        Recommendation::UpdateReferences { count } => {
            format!("Update references held by {} direct dependents", count)
        }
        Recommendation::NotifyCriticalOwners { count } => {
            format!("Notify owners of {} critical dependents", count)
        }
        Recommendation::StagedRollout { affected } => {
            format!("Roll out in stages; {} entities affected", affected)
        }
    }
}

fn diagnostics_footer(diagnostics: &Diagnostics) -> String {
    let mut lines = Vec::new();
    if diagnostics.truncated {
        lines.push("warning: deadline reached, results truncated".to_string());
    }
    for skipped in &diagnostics.skipped {
        lines.push(format!("warning: skipped {}: {}", skipped.branch, skipped.reason));
    }
    for limit in &diagnostics.limits_applied {
        lines.push(format!(
            "note: {} capped at {} (saw {})",
            limit.limit, limit.cap, limit.observed
        ));
    }
    for fallback in &diagnostics.parse_fallbacks {
        lines.push(format!("note: could not parse {} value {:?}", fallback.variable, fallback.raw));
    }
    lines.join("\n")
}

fn plan_footer(diagnostics: &PlanDiagnostics) -> String {
    let mut lines = Vec::new();
    if let Some(cycle) = &diagnostics.cycle {
        lines.push(format!(
            "warning: dependency cycle among {}; these run in input order",
            cycle.entities.join(", ")
        ));
    }
    if diagnostics.ordering_partial {
        lines.push("warning: dependency lookup failed, order may be incomplete".to_string());
    }
    for unknown in &diagnostics.unknown_rules {
        lines.push(format!("warning: no strategy for {} on {}", unknown.rule_id, unknown.entity));
    }
    for dropped in &diagnostics.dropped_changes {
        lines.push(format!(
            "warning: dropped change #{} ({}): {}",
            dropped.index, dropped.rule_id, dropped.reason
        ));
    }
    if diagnostics.unattributed_changes > 0 {
        lines.push(format!(
            "note: {} changes have no owning entity",
            diagnostics.unattributed_changes
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontoplan_proto::{ConflictType, ImpactKind, ImpactScope, Severity};

    fn orphan() -> SemanticConflict {
        SemanticConflict {
            conflict_type: ConflictType::OrphanedNode,
            severity: Severity::Low,
            affected_nodes: vec!["Audit".into()],
            description: "1 entity has no relations".into(),
            suggested_resolution: "Link or remove it".into(),
            impact_scope: ImpactScope::Local,
        }
    }

    #[test]
    fn test_empty_conflicts() {
        let outcome = AnalysisOutcome::new(Vec::new(), Diagnostics::default());
        let output = TableFormatter.format_conflicts(&outcome).unwrap();
        assert_eq!(output, "No conflicts");
    }

    #[test]
    fn test_conflict_table_and_footer() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.limit("orphan_scan_limit", 100, 101);
        let outcome = AnalysisOutcome::new(vec![orphan()], diagnostics);
        let output = TableFormatter.format_conflicts(&outcome).unwrap();

        assert!(output.contains("Audit"));
        assert!(output.contains("ORPHANED_NODE"));
        assert!(output.contains("orphan_scan_limit capped at 100"));
    }

    #[test]
    fn test_impact_without_dependents() {
        let report = ImpactReport {
            entity: "Audit".into(),
            change_kind: ImpactKind::Deletion,
            direct_dependents: Vec::new(),
            transitive_dependents: Vec::new(),
            critical_dependents: Vec::new(),
            total_affected: 0,
            risk: Severity::Low,
            recommendations: vec![Recommendation::NoDependents],
            diagnostics: Diagnostics::default(),
        };
        let output = TableFormatter.format_impact(&report).unwrap();

        assert!(output.starts_with("deletion of Audit: 0 affected, risk low"));
        assert!(output.contains("No dependents"));
    }

    #[test]
    fn test_json_is_parseable() {
        let outcome = AnalysisOutcome::new(vec![orphan()], Diagnostics::default());
        let output = JsonFormatter.format_conflicts(&outcome).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["value"][0]["conflict_type"], "ORPHANED_NODE");
    }
}
