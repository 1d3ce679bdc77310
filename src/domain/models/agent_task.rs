//! Agent task domain model.
//!
//! An agent task is one concurrently executing unit of work inside a build
//! session, responsible for one partition of the requested change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::Discovery;

/// Status of an agent task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentTaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl Default for AgentTaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl AgentTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        match self {
            Self::Pending => matches!(new_status, Self::Running | Self::Failed),
            Self::Running => matches!(new_status, Self::Completed | Self::Failed),
            Self::Completed | Self::Failed => false,
        }
    }
}

impl std::fmt::Display for AgentTaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A slice of work assigned to a single agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkPartition {
    /// Stable id within the plan (e.g. `phase-0`, `feature-auth`).
    pub id: String,
    /// Short name shown in progress output.
    pub name: String,
    /// Description handed to the agent.
    pub description: String,
    /// Declared merge priority; lower wins.
    #[serde(default)]
    pub priority: u32,
    /// Files the planner expects this partition to touch.
    #[serde(default)]
    pub files: Vec<String>,
}

impl WorkPartition {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: description.into(),
            priority: 0,
            files: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    /// Partition an implementation plan: one partition per phase, or one per
    /// feature when the plan has no phases. Priority follows plan order.
    pub fn from_plan(plan: &ImplementationPlan) -> Vec<WorkPartition> {
        if !plan.phases.is_empty() {
            return plan
                .phases
                .iter()
                .enumerate()
                .map(|(idx, phase)| {
                    let id = phase.id.clone().unwrap_or_else(|| format!("phase-{idx}"));
                    let name = phase.name.clone().unwrap_or_else(|| "Unnamed Phase".to_string());
                    let mut description = name.clone();
                    if !phase.features.is_empty() {
                        description.push_str(": ");
                        description.push_str(&phase.features.join(", "));
                    }
                    WorkPartition {
                        id,
                        name,
                        description,
                        priority: u32::try_from(idx).unwrap_or(u32::MAX),
                        files: Vec::new(),
                    }
                })
                .collect();
        }

        plan.features
            .iter()
            .enumerate()
            .map(|(idx, feature)| {
                let id = feature.id.clone().unwrap_or_else(|| format!("feature-{idx}"));
                let name = feature.name.clone().unwrap_or_else(|| "Unnamed Feature".to_string());
                let description = if feature.description.is_empty() {
                    name.clone()
                } else {
                    feature.description.clone()
                };
                WorkPartition {
                    id,
                    name,
                    description,
                    priority: feature
                        .priority
                        .unwrap_or_else(|| u32::try_from(idx).unwrap_or(u32::MAX)),
                    files: feature.files.clone(),
                }
            })
            .collect()
    }
}

/// Planner output: either phases or a flat feature list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImplementationPlan {
    #[serde(default)]
    pub phases: Vec<PlanPhase>,
    #[serde(default)]
    pub features: Vec<PlanFeature>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanPhase {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanFeature {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub files: Vec<String>,
    pub priority: Option<u32>,
}

/// One file write performed by an agent, kept as an audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    /// New content; `None` records a deletion.
    pub content: Option<String>,
    pub written_at: DateTime<Utc>,
}

impl FileChange {
    pub fn write(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
            written_at: Utc::now(),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: None,
            written_at: Utc::now(),
        }
    }

    pub fn is_delete(&self) -> bool {
        self.content.is_none()
    }
}

/// Structured reason for an agent task failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentFailure {
    pub reason: String,
    /// Whether a retry could succeed (rate limits, transport errors).
    #[serde(default)]
    pub retryable: bool,
}

impl AgentFailure {
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: false,
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: true,
        }
    }
}

/// A concurrently executing unit of work inside a build session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: Uuid,
    /// Agent identifier used on the context bus.
    pub agent_id: String,
    pub assigned_partition: WorkPartition,
    pub status: AgentTaskStatus,
    pub discoveries: Vec<Discovery>,
    /// Every file write in the order it happened.
    pub output: Vec<FileChange>,
    pub failure: Option<AgentFailure>,
    /// Free-form summary returned by the agent.
    pub summary: Option<String>,
    pub cost_usd: f64,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl AgentTask {
    pub fn new(partition: WorkPartition) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id: format!("agent-{}", partition.id),
            assigned_partition: partition,
            status: AgentTaskStatus::Pending,
            discoveries: Vec::new(),
            output: Vec::new(),
            failure: None,
            summary: None,
            cost_usd: 0.0,
            attempts: 0,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn priority(&self) -> u32 {
        self.assigned_partition.priority
    }

    /// Final content per path after all of this task's writes, in path order.
    /// `None` means the task's last action on the path was a deletion.
    pub fn final_writes(&self) -> std::collections::BTreeMap<String, Option<String>> {
        let mut out = std::collections::BTreeMap::new();
        for change in &self.output {
            out.insert(change.path.clone(), change.content.clone());
        }
        out
    }

    pub fn mark_running(&mut self) {
        if self.status.can_transition_to(AgentTaskStatus::Running) {
            self.status = AgentTaskStatus::Running;
            self.started_at = Some(Utc::now());
        }
    }

    pub fn mark_completed(&mut self, summary: Option<String>) {
        if self.status.can_transition_to(AgentTaskStatus::Completed) {
            self.status = AgentTaskStatus::Completed;
            self.summary = summary;
            self.ended_at = Some(Utc::now());
        }
    }

    pub fn mark_failed(&mut self, failure: AgentFailure) {
        if self.status.can_transition_to(AgentTaskStatus::Failed) {
            self.status = AgentTaskStatus::Failed;
            self.failure = Some(failure);
            self.ended_at = Some(Utc::now());
        }
    }

    pub fn duration_secs(&self) -> Option<f64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }
}
