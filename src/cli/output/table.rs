//! Table output formatting for terminal reports using comfy-table.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use super::truncate;
use crate::domain::models::{AgentTaskStatus, BuildPhase, TerminalReport};

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self { use_colors, max_width }
    }

    fn header(names: &[&str]) -> Vec<Cell> {
        names
            .iter()
            .map(|n| Cell::new(n).add_attribute(Attribute::Bold))
            .collect()
    }

    fn colored(&self, text: String, color: Color) -> Cell {
        if self.use_colors {
            Cell::new(text).fg(color)
        } else {
            Cell::new(text)
        }
    }

    /// One row per report.
    pub fn format_reports(&self, reports: &[TerminalReport]) -> String {
        let mut table = self.create_base_table();
        table.set_header(Self::header(&[
            "Build", "Project", "Phase", "Tasks", "Cost", "Duration", "Completed",
        ]));

        for report in reports {
            let phase = if report.partial {
                format!("{} (partial)", report.phase)
            } else {
                report.phase.to_string()
            };
            table.add_row(vec![
                Cell::new(&report.build_id.to_string()[..8]),
                Cell::new(truncate(&report.project_id, 24)),
                self.colored(phase, phase_color(report.phase)),
                Cell::new(format!("{}/{}", report.tasks_completed, report.tasks.len())),
                Cell::new(format!("${:.2}", report.total_cost_usd)),
                Cell::new(&report.duration),
                Cell::new(report.completed_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            ]);
        }

        table.to_string()
    }

    /// Agent tasks of one report.
    pub fn format_tasks(&self, report: &TerminalReport) -> String {
        let mut table = self.create_base_table();
        table.set_header(Self::header(&["Agent", "Partition", "Status", "Files", "Cost", "Reason"]));

        for task in &report.tasks {
            table.add_row(vec![
                Cell::new(&task.agent_id),
                Cell::new(truncate(&task.partition, 32)),
                self.colored(task.status.to_string(), task_color(task.status)),
                Cell::new(task.files_written),
                Cell::new(format!("${:.2}", task.cost_usd)),
                Cell::new(truncate(task.failure_reason.as_deref().unwrap_or(""), 48)),
            ]);
        }

        table.to_string()
    }

    /// Merge conflicts of one report, or `None` when there were none.
    pub fn format_conflicts(&self, report: &TerminalReport) -> Option<String> {
        let merge = report.merge_report.as_ref().filter(|m| !m.conflicts.is_empty())?;
        let mut table = self.create_base_table();
        table.set_header(Self::header(&["Path", "Agents", "Strategy", "Resolved"]));

        for conflict in &merge.conflicts {
            let resolved = if conflict.resolved { "yes" } else { "no" };
            table.add_row(vec![
                Cell::new(&conflict.path),
                Cell::new(conflict.conflicting_agents.join(", ")),
                Cell::new(conflict.resolution_strategy.as_str()),
                self.colored(
                    resolved.to_string(),
                    if conflict.resolved { Color::Green } else { Color::Red },
                ),
            ]);
        }

        Some(table.to_string())
    }

    /// Verification checks of one report, or `None` if verification never ran.
    pub fn format_checks(&self, report: &TerminalReport) -> Option<String> {
        let verification = report.verification_report.as_ref()?;
        let mut table = self.create_base_table();
        table.set_header(Self::header(&["Check", "Result", "Blocking", "Detail"]));

        for check in &verification.checks {
            let (text, color) = match (check.passed, check.blocking) {
                (true, _) => ("pass", Color::Green),
                (false, true) => ("FAIL", Color::Red),
                (false, false) => ("warn", Color::Yellow),
            };
            table.add_row(vec![
                Cell::new(&check.name),
                self.colored(text.to_string(), color),
                Cell::new(if check.blocking { "yes" } else { "no" }),
                Cell::new(truncate(&check.detail, 60)),
            ]);
        }

        Some(table.to_string())
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if let Some(width) = self.max_width {
            table.set_width(width);
        }
        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

fn phase_color(phase: BuildPhase) -> Color {
    match phase {
        BuildPhase::Done => Color::Green,
        BuildPhase::Failed => Color::Red,
        BuildPhase::Cancelled => Color::DarkGrey,
        _ => Color::Cyan,
    }
}

fn task_color(status: AgentTaskStatus) -> Color {
    match status {
        AgentTaskStatus::Completed => Color::Green,
        AgentTaskStatus::Running => Color::Cyan,
        AgentTaskStatus::Failed => Color::Red,
        AgentTaskStatus::Pending => Color::White,
    }
}
