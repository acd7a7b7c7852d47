//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::planner::{Operation, ReconciliationPlan};
use crate::reconciler::{DriftReport, ReconciliationResult};
use crate::resource::LifecycleState;
use crate::state::{ResourceRecord, WorkspaceState};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan operation row for table display.
#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Studio")]
    studio: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Details")]
    details: String,
}

/// Studio row for state display.
#[derive(Tabled)]
struct StudioRow {
    #[tabled(rename = "Studio")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Remote status")]
    status: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the plans of every studio.
    #[must_use]
    pub fn format_plans(&self, plans: &[ReconciliationPlan]) -> String {
        match self.format {
            OutputFormat::Json => to_json(&plans),
            OutputFormat::Text => Self::format_plans_text(plans),
        }
    }

    fn format_plans_text(plans: &[ReconciliationPlan]) -> String {
        let pending: Vec<&ReconciliationPlan> = plans.iter().filter(|p| !p.is_empty()).collect();
        if pending.is_empty() {
            return format!(
                "{} No changes required - {} studio(s) up to date.\n",
                "✓".green(),
                plans.len()
            );
        }

        let mut output = String::from("\nReconciliation plan\n\n");
        let rows: Vec<PlanRow> = pending
            .iter()
            .flat_map(|plan| plan.operations.iter().map(move |op| (plan.resource.as_str(), op)))
            .enumerate()
            .map(|(i, (studio, op))| PlanRow {
                index: i + 1,
                studio: studio.to_string(),
                action: Self::format_operation(op),
                details: Self::truncate(&Self::operation_details(op), 60),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let count = |f: fn(&Operation) -> bool| {
            pending
                .iter()
                .flat_map(|p| p.operations.iter())
                .filter(|op| f(op))
                .count()
        };
        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to destroy\n",
            count(|op| matches!(op, Operation::Create(_))).to_string().green(),
            count(|op| matches!(op, Operation::Update(_))).to_string().yellow(),
            count(|op| matches!(op, Operation::Delete(_))).to_string().red()
        );
        output
    }

    /// Formats a project-wide apply or destroy result.
    #[must_use]
    pub fn format_reconciliation(&self, result: &ReconciliationResult) -> String {
        match self.format {
            OutputFormat::Json => to_json(result),
            OutputFormat::Text => {
                let status = if result.success {
                    format!("{} Reconciliation successful", "✓".green())
                } else {
                    format!("{} Reconciliation failed", "✗".red())
                };

                let mut output = format!("{status}\n\n");
                let _ = writeln!(output, "   Created: {}", result.created);
                let _ = writeln!(output, "   Updated: {}", result.updated);
                let _ = writeln!(output, "   Deleted: {}", result.deleted);
                let _ = writeln!(output, "   Unchanged: {}", result.unchanged);

                if !result.drift.is_empty() {
                    let _ = write!(output, "\n{} Drift:\n", "⚠".yellow());
                    for drift in &result.drift {
                        let _ = writeln!(output, "   - {drift}");
                    }
                }
                if !result.errors.is_empty() {
                    let _ = write!(output, "\n{} Errors:\n", "✗".red());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                output
            }
        }
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => {
                if report.is_converged() {
                    return format!("{} No drift detected - state is converged.\n", "✓".green());
                }

                let mut output = format!("{} Drift detected:\n\n", "⚠".yellow());
                for resource in &report.drifted_resources {
                    let _ = writeln!(output, "   - {resource} needs changes");
                }
                for change in &report.changes {
                    let _ = writeln!(output, "   - {change}");
                }
                for orphan in &report.orphaned {
                    let _ = writeln!(output, "   - {orphan} is tracked but no longer declared");
                }
                for error in &report.errors {
                    let _ = writeln!(output, "   {} {error}", "✗".red());
                }
                let _ = write!(
                    output,
                    "\n{}/{} studios have drifted.\n",
                    report.drifted_resources.len(),
                    report.total_resources
                );
                output
            }
        }
    }

    /// Formats the whole workspace state.
    #[must_use]
    pub fn format_state(&self, state: &WorkspaceState) -> String {
        match self.format {
            OutputFormat::Json => to_json(state),
            OutputFormat::Text => {
                let mut output = format!("\nState: {}/{}\n\n", state.project, state.environment);
                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                let _ = writeln!(output, "   Studios: {}\n", state.studios.len());

                let rows: Vec<StudioRow> = state
                    .studio_names()
                    .into_iter()
                    .filter_map(|name| state.get(name))
                    .map(|record| StudioRow {
                        name: record.name.clone(),
                        state: Self::format_lifecycle(record.lifecycle),
                        id: record.id.as_ref().map_or_else(|| String::from("-"), ToString::to_string),
                        status: record
                            .observed
                            .as_ref()
                            .map_or_else(|| String::from("-"), |o| o.status.to_string()),
                        updated: record.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                    })
                    .collect();
                if !rows.is_empty() {
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.success { "✓".green() } else { "✗".red() };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} ({})",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.resources.join(", ")
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats one studio record with its observed attributes.
    #[must_use]
    pub fn format_record(&self, record: &ResourceRecord) -> String {
        match self.format {
            OutputFormat::Json => to_json(record),
            OutputFormat::Text => {
                let mut output = format!("\nStudio: {}\n\n", record.name.bold());
                let _ = writeln!(output, "   State: {}", Self::format_lifecycle(record.lifecycle));
                if let Some(id) = &record.id {
                    let _ = writeln!(output, "   ID: {id}");
                }
                if let Some(hash) = &record.config_hash {
                    let _ = writeln!(output, "   Config hash: {}", &hash[..8.min(hash.len())]);
                }
                if let Some(created) = record.created_at {
                    let _ = writeln!(output, "   Created: {created}");
                }

                if let Some(observed) = &record.observed {
                    let _ = writeln!(output, "\n   Observed ({}):", observed.status);
                    for (key, value) in observed.flatten() {
                        let _ = writeln!(output, "     {key} = {value}");
                    }
                }
                output
            }
        }
    }

    fn format_operation(op: &Operation) -> String {
        match op {
            Operation::Create(_) => "+create".green().to_string(),
            Operation::Update(_) => "~update".yellow().to_string(),
            Operation::Delete(_) => "-delete".red().to_string(),
        }
    }

    fn operation_details(op: &Operation) -> String {
        match op {
            Operation::Create(desired) => desired.name().unwrap_or("<unnamed>").to_string(),
            Operation::Update(changes) => changes.to_string(),
            Operation::Delete(id) => id.to_string(),
        }
    }

    fn format_lifecycle(state: LifecycleState) -> String {
        match state {
            LifecycleState::Present => "present".green().to_string(),
            LifecycleState::Absent => "absent".dimmed().to_string(),
            other => other.to_string().yellow().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ATTR_NAME, AttributeValue, DesiredConfiguration};

    fn create_plan() -> ReconciliationPlan {
        let desired =
            DesiredConfiguration::new().with_attribute(ATTR_NAME, AttributeValue::text("analytics"));
        let mut plan = ReconciliationPlan::empty("main", "abc");
        plan.operations.push(Operation::Create(desired));
        plan
    }

    #[test]
    fn test_converged_plans() {
        colored::control::set_override(false);
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let text = formatter.format_plans(&[ReconciliationPlan::empty("main", "abc")]);
        assert!(text.contains("No changes required"));
    }

    #[test]
    fn test_plan_table_counts_operations() {
        colored::control::set_override(false);
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let text = formatter.format_plans(&[create_plan()]);
        assert!(text.contains("analytics"));
        assert!(text.contains("1 to create, 0 to update, 0 to destroy"));
    }

    #[test]
    fn test_json_plans() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json: serde_json::Value = serde_json::from_str(&formatter.format_plans(&[create_plan()])).unwrap();
        assert_eq!(json[0]["resource"], "main");
        assert!(json[0]["operations"][0]["create"].is_object());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("a much longer string", 10), "a much ...");
    }
}
