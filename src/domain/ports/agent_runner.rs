//! Agent runner port - interface for the coding-agent backend.
//!
//! The orchestrator never builds prompts or picks models. It hands a runner
//! an [`AgentContext`] scoped to one partition and gets back a structured
//! outcome.

use async_trait::async_trait;

use crate::domain::errors::BuildResult;
use crate::domain::models::{AgentFailure, ContextEntry, Discovery, WorkPartition};

/// Successful result of an agent run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentOutcome {
    pub summary: Option<String>,
    /// Spend attributed to this run.
    pub cost_usd: f64,
}

impl AgentOutcome {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            cost_usd: 0.0,
        }
    }

    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = cost_usd;
        self
    }
}

/// Everything an agent may touch while it works.
///
/// Writes go through the dispatcher so same-path writes are serialised and
/// recorded, and so no write lands once cancellation has been observed.
#[async_trait]
pub trait AgentContext: Send + Sync {
    fn agent_id(&self) -> &str;

    fn partition(&self) -> &WorkPartition;

    /// True once the build has been cancelled or timed out.
    fn is_cancelled(&self) -> bool;

    /// Entries on the shared context bus, in publish order.
    fn query(&self, task_filter: Option<&str>, exclude_self: bool) -> Vec<ContextEntry>;

    /// Announce a fact to sibling agents.
    fn publish(&self, discovery: Discovery);

    async fn read_file(&self, path: &str) -> BuildResult<Option<String>>;

    async fn write_file(&self, path: &str, content: &str) -> BuildResult<()>;

    async fn delete_file(&self, path: &str) -> BuildResult<()>;
}

/// Backend that performs the work for one partition.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Runner name for logs.
    fn name(&self) -> &'static str;

    /// Run the agent to completion. A returned failure marked `retryable`
    /// may be retried by the dispatcher.
    async fn run(&self, ctx: &dyn AgentContext) -> Result<AgentOutcome, AgentFailure>;
}
