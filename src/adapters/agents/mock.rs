//! Mock agent runner for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::scripted::{execute_steps, AgentStep};
use crate::domain::models::AgentFailure;
use crate::domain::ports::{AgentContext, AgentOutcome, AgentRunner};

/// Behaviour configured for one partition id.
#[derive(Debug, Clone, Default)]
struct MockBehaviour {
    steps: Vec<AgentStep>,
    failure: Option<String>,
    transient_failures: u32,
    cost_usd: f64,
}

struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Agent runner with per-partition canned behaviour.
///
/// Unknown partitions complete immediately without touching the sandbox.
#[derive(Default)]
pub struct MockAgentRunner {
    behaviours: HashMap<String, MockBehaviour>,
    attempts: Mutex<HashMap<String, u32>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockAgentRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn behaviour(&mut self, partition_id: &str) -> &mut MockBehaviour {
        self.behaviours.entry(partition_id.to_string()).or_default()
    }

    /// Steps to run for `partition_id`, appended to any already set.
    pub fn with_script(mut self, partition_id: &str, steps: Vec<AgentStep>) -> Self {
        self.behaviour(partition_id).steps.extend(steps);
        self
    }

    /// Fail permanently before running any step.
    pub fn with_failure(mut self, partition_id: &str, reason: &str) -> Self {
        self.behaviour(partition_id).failure = Some(reason.to_string());
        self
    }

    /// Fail with a retryable error on the first `count` attempts.
    pub fn with_transient_failures(mut self, partition_id: &str, count: u32) -> Self {
        self.behaviour(partition_id).transient_failures = count;
        self
    }

    pub fn with_cost(mut self, partition_id: &str, cost_usd: f64) -> Self {
        self.behaviour(partition_id).cost_usd = cost_usd;
        self
    }

    /// Highest number of runs observed in flight at once.
    pub fn peak_concurrency(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.peak)
    }

    /// Number of times `partition_id` has been run.
    pub fn attempts(&self, partition_id: &str) -> u32 {
        let attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        attempts.get(partition_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl AgentRunner for MockAgentRunner {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn run(&self, ctx: &dyn AgentContext) -> Result<AgentOutcome, AgentFailure> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = RunningGuard(Arc::clone(&self.running));

        let id = ctx.partition().id.clone();
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
            let entry = attempts.entry(id.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        let Some(behaviour) = self.behaviours.get(&id) else {
            return Ok(AgentOutcome::new("nothing to do"));
        };
        if attempt <= behaviour.transient_failures {
            return Err(AgentFailure::transient(format!("rate limited (attempt {attempt})")));
        }
        if let Some(reason) = &behaviour.failure {
            return Err(AgentFailure::permanent(reason.clone()));
        }

        let done = execute_steps(ctx, &behaviour.steps).await?;
        Ok(AgentOutcome::new(format!("{done} step(s) applied")).with_cost(behaviour.cost_usd))
    }
}
