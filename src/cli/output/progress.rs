//! Live build progress for the terminal.
//!
//! A spinner shows the current phase while agents work; notable events are
//! printed above it as styled lines.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::domain::models::{AgentTaskStatus, BuildPhase};
use crate::services::{ProgressEvent, ProgressPayload};

const SPINNER_TEMPLATE: &str = "[{elapsed_precise}] {spinner:.green} {msg}";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Create a spinner for indeterminate operations
pub fn create_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
        spinner.set_style(style.tick_chars(SPINNER_CHARS));
    }
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Extension trait for ProgressBar to add common utility methods
pub trait ProgressBarExt {
    fn finish_success(&self, message: impl Into<String>);

    fn finish_error(&self, message: impl Into<String>);

    fn finish_warning(&self, message: impl Into<String>);
}

impl ProgressBarExt for ProgressBar {
    fn finish_success(&self, message: impl Into<String>) {
        self.finish_with_message(format!("{} {}", style("✓").green(), message.into()));
    }

    fn finish_error(&self, message: impl Into<String>) {
        self.finish_with_message(format!("{} {}", style("✗").red(), message.into()));
    }

    fn finish_warning(&self, message: impl Into<String>) {
        self.finish_with_message(format!("{} {}", style("!").yellow(), message.into()));
    }
}

/// Human-readable line for an event, or `None` for events not worth a line.
pub fn describe(event: &ProgressEvent) -> Option<String> {
    let line = match &event.payload {
        ProgressPayload::BuildStarted { project_id } => format!("build started for {project_id}"),
        ProgressPayload::PhaseChanged { to, .. } => format!("{} {to}", style("→").cyan()),
        ProgressPayload::ContractLocked { criteria } => format!("intent locked: {criteria} success criteria"),
        ProgressPayload::SandboxOpened { sandbox_id } => format!("sandbox {sandbox_id} opened"),
        ProgressPayload::TasksPartitioned { count } => format!("work split into {count} partition(s)"),
        ProgressPayload::AgentStatusChanged {
            agent_id,
            status: AgentTaskStatus::Failed,
            reason,
            ..
        } => format!(
            "{} {agent_id} failed: {}",
            style("✗").red(),
            reason.as_deref().unwrap_or("unknown")
        ),
        ProgressPayload::AgentStatusChanged {
            agent_id,
            status: AgentTaskStatus::Completed,
            ..
        } => format!("{} {agent_id} completed", style("✓").green()),
        ProgressPayload::AgentRetrying {
            agent_id,
            attempt,
            max_attempts,
        } => format!("{} {agent_id} retrying ({attempt}/{max_attempts})", style("!").yellow()),
        ProgressPayload::BudgetExceeded { spent_usd, limit_usd } => format!(
            "{} budget reached: ${spent_usd:.2} of ${limit_usd:.2}",
            style("!").yellow()
        ),
        ProgressPayload::MergeCompleted {
            conflicts, unresolved, ..
        } => format!("merge: {conflicts} overlapping path(s), {unresolved} unresolved"),
        ProgressPayload::CheckCompleted { name, passed, blocking } => {
            let mark = match (passed, blocking) {
                (true, _) => style("✓").green(),
                (false, true) => style("✗").red(),
                (false, false) => style("!").yellow(),
            };
            format!("{mark} check {name}")
        }
        ProgressPayload::IntentEvaluated { satisfied, total } => {
            format!("intent: {satisfied}/{total} criteria satisfied")
        }
        ProgressPayload::DemoReady { files } => format!("demo ready: {files} file(s)"),
        ProgressPayload::ContextPublished { .. }
        | ProgressPayload::AgentStatusChanged { .. }
        | ProgressPayload::SandboxClosed { .. }
        | ProgressPayload::VerificationCompleted { .. }
        | ProgressPayload::BuildFinished { .. } => return None,
    };
    Some(line)
}

/// Drives a spinner from a build's progress events.
pub struct ProgressRenderer {
    spinner: ProgressBar,
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self {
            spinner: create_spinner(),
        }
    }

    /// No terminal output, for `--json` runs.
    pub fn hidden() -> Self {
        Self {
            spinner: ProgressBar::hidden(),
        }
    }

    pub fn handle(&self, event: &ProgressEvent) {
        if let ProgressPayload::PhaseChanged { to, .. } = &event.payload {
            self.spinner.set_message(to.to_string());
        }
        if let ProgressPayload::BuildFinished {
            phase, failure_reason, ..
        } = &event.payload
        {
            let reason = failure_reason.as_deref().unwrap_or_default();
            match phase {
                BuildPhase::Done => self.spinner.finish_success("build complete"),
                BuildPhase::Cancelled => self.spinner.finish_warning("build cancelled"),
                _ => self.spinner.finish_error(format!("build failed: {reason}")),
            }
            return;
        }
        if let Some(line) = describe(event) {
            self.spinner.println(line);
        }
    }
}

impl Default for ProgressRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ProgressBus;
    use uuid::Uuid;

    #[test]
    fn describes_notable_events_only() {
        console::set_colors_enabled(false);
        let bus = ProgressBus::default();
        let build_id = Uuid::new_v4();
        bus.emit(build_id, ProgressPayload::TasksPartitioned { count: 3 });
        bus.emit(
            build_id,
            ProgressPayload::ContextPublished {
                agent_id: "agent-a".into(),
                kind: crate::domain::models::DiscoveryKind::Note,
                summary: "x".into(),
            },
        );
        bus.emit(
            build_id,
            ProgressPayload::AgentRetrying {
                agent_id: "agent-a".into(),
                attempt: 1,
                max_attempts: 3,
            },
        );
        let lines: Vec<String> = bus.history(build_id).iter().filter_map(describe).collect();
        assert_eq!(
            lines,
            vec![
                "work split into 3 partition(s)".to_string(),
                "! agent-a retrying (1/3)".to_string()
            ]
        );
    }
}
