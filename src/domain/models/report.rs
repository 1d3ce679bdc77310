//! Terminal report persisted when a build session ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::agent_task::AgentTaskStatus;
use super::merge::MergeReport;
use super::phase::BuildPhase;
use super::session::BuildSession;
use super::verification::VerificationReport;
use crate::domain::errors::ErrorKind;

/// Per-agent line of a terminal report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub agent_id: String,
    pub partition: String,
    pub status: AgentTaskStatus,
    pub files_written: usize,
    pub cost_usd: f64,
    pub failure_reason: Option<String>,
}

/// Summary record of a finished build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalReport {
    pub build_id: Uuid,
    pub project_id: String,
    pub user_id: String,
    pub phase: BuildPhase,
    /// Criterion id to pass/fail; empty if the pipeline never got that far.
    pub intent_satisfaction: BTreeMap<String, bool>,
    pub merge_report: Option<MergeReport>,
    pub verification_report: Option<VerificationReport>,
    pub failure_reason: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// DONE with at least one failed agent task.
    pub partial: bool,
    pub tasks: Vec<TaskSummary>,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub total_cost_usd: f64,
    pub duration_secs: f64,
    pub duration: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl TerminalReport {
    /// Build the report for a terminal session. `scrub` is applied to every
    /// human-readable failure string.
    pub fn from_session(session: &BuildSession, scrub: impl Fn(&str) -> String) -> Self {
        let tasks: Vec<TaskSummary> = session
            .agent_tasks
            .iter()
            .map(|t| TaskSummary {
                agent_id: t.agent_id.clone(),
                partition: t.assigned_partition.name.clone(),
                status: t.status,
                files_written: t.final_writes().len(),
                cost_usd: t.cost_usd,
                failure_reason: t.failure.as_ref().map(|f| scrub(&f.reason)),
            })
            .collect();
        let tasks_completed = session.tasks_with_status(AgentTaskStatus::Completed);
        let tasks_failed = session.tasks_with_status(AgentTaskStatus::Failed);
        let duration_secs = session.duration_secs();

        Self {
            build_id: session.id,
            project_id: session.project_id.clone(),
            user_id: session.user_id.clone(),
            phase: session.phase(),
            intent_satisfaction: session.intent_satisfaction.clone(),
            merge_report: session.merge_report().cloned(),
            verification_report: session.verification_report().cloned(),
            failure_reason: session.failure_reason().map(|reason| scrub(reason)),
            error_kind: session.failure_kind(),
            partial: session.phase() == BuildPhase::Done && tasks_failed > 0,
            tasks,
            tasks_completed,
            tasks_failed,
            total_cost_usd: session.total_cost_usd(),
            duration_secs,
            duration: format_duration(duration_secs),
            created_at: session.created_at,
            completed_at: session.completed_at.unwrap_or_else(Utc::now),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.phase == BuildPhase::Done
    }
}

/// Human-readable duration: `12.5s`, `3.2m`, `1.5h`, `2.0d`.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else if seconds < 3600.0 {
        format!("{:.1}m", seconds / 60.0)
    } else if seconds < 86_400.0 {
        format!("{:.1}h", seconds / 3600.0)
    } else {
        format!("{:.1}d", seconds / 86_400.0)
    }
}
