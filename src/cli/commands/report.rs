//! Report CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use super::open_report_store;
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{BuildPhase, TerminalReport};
use crate::domain::ports::ReportStore;
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct ReportArgs {
    #[command(subcommand)]
    pub command: ReportCommands,
}

#[derive(Subcommand, Debug)]
pub enum ReportCommands {
    /// Show one build's terminal report
    Show {
        /// Build ID (full UUID or unique prefix)
        id: String,
    },
    /// List recent builds
    List {
        /// Only builds of this project
        #[arg(short, long)]
        project: Option<String>,
        /// Maximum number of reports to display
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

/// Full report with tables for tasks, conflicts and checks.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ReportDetailOutput(pub TerminalReport);

impl CommandOutput for ReportDetailOutput {
    fn to_human(&self) -> String {
        let report = &self.0;
        let formatter = TableFormatter::new();
        let mut lines = vec![
            format!("Build: {}", report.build_id),
            format!("Project: {}", report.project_id),
            format!(
                "Phase: {}{}",
                report.phase,
                if report.partial { " (partial)" } else { "" }
            ),
            format!("Duration: {}", report.duration),
            format!("Cost: ${:.2}", report.total_cost_usd),
            format!(
                "Tasks: {} completed, {} failed",
                report.tasks_completed, report.tasks_failed
            ),
        ];
        if let Some(reason) = &report.failure_reason {
            let kind = report.error_kind.map(|k| format!(" [{k}]")).unwrap_or_default();
            lines.push(format!("Failure: {reason}{kind}"));
        }

        if !report.intent_satisfaction.is_empty() {
            lines.push("\nSuccess criteria:".to_string());
            for (id, met) in &report.intent_satisfaction {
                lines.push(format!("  {} {id}", if *met { "✓" } else { "✗" }));
            }
        }
        if !report.tasks.is_empty() {
            lines.push(format!("\nAgents:\n{}", formatter.format_tasks(report)));
        }
        if let Some(conflicts) = formatter.format_conflicts(report) {
            lines.push(format!("\nMerge conflicts:\n{conflicts}"));
        }
        if let Some(checks) = formatter.format_checks(report) {
            lines.push(format!("\nVerification:\n{checks}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ReportListOutput {
    pub reports: Vec<TerminalReport>,
    pub total: usize,
}

impl CommandOutput for ReportListOutput {
    fn to_human(&self) -> String {
        if self.reports.is_empty() {
            return "No builds found.".to_string();
        }
        let done = self.reports.iter().filter(|r| r.phase == BuildPhase::Done).count();
        format!(
            "{} build(s), {done} done:\n{}",
            self.total,
            TableFormatter::new().format_reports(&self.reports)
        )
    }
}

/// Resolve a full id or a unique prefix among recent reports.
async fn resolve_build_id(store: &dyn ReportStore, id: &str) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return Ok(uuid);
    }
    let prefix = id.to_lowercase();
    let matches: Vec<Uuid> = store
        .list_recent(1000)
        .await?
        .into_iter()
        .map(|r| r.build_id)
        .filter(|b| b.to_string().starts_with(&prefix))
        .collect();
    match matches.as_slice() {
        [one] => Ok(*one),
        [] => anyhow::bail!("No build matches '{id}'"),
        _ => anyhow::bail!("Build id prefix '{id}' is ambiguous ({} matches)", matches.len()),
    }
}

pub async fn execute(args: ReportArgs, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load().context("Failed to load configuration")?;
    let store = open_report_store(&config).await?;

    match args.command {
        ReportCommands::Show { id } => {
            let build_id = resolve_build_id(store.as_ref(), &id).await?;
            let report = store
                .get(build_id)
                .await?
                .with_context(|| format!("No report for build {build_id}"))?;
            output(&ReportDetailOutput(report), json_mode);
        }
        ReportCommands::List { project, limit } => {
            let reports = match project {
                Some(project) => store.list_for_project(&project, limit).await?,
                None => store.list_recent(limit).await?,
            };
            let total = reports.len();
            output(&ReportListOutput { reports, total }, json_mode);
        }
    }
    Ok(())
}
