//! Agent dispatcher.
//!
//! Runs one agent per work partition with bounded parallelism. Agents share
//! the build's context bus and sandbox through a [`AgentContext`] handle that
//! serialises same-path writes, records every write, and refuses writes once
//! cancellation has been observed.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::models::{
    normalize_path, AgentFailure, AgentTask, AgentTaskStatus, Config, ContextEntry, Discovery,
    FileChange, RetryConfig, WorkPartition,
};
use crate::domain::ports::{AgentContext, AgentRunner, Sandbox};
use crate::infrastructure::logging::SecretScrubber;
use crate::services::context_bus::ContextBus;
use crate::services::progress_bus::{ProgressBus, ProgressPayload};

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum agents running at once.
    pub max_concurrent_agents: usize,
    /// Stop starting agents once this much has been spent.
    pub budget_limit_usd: Option<f64>,
    /// Agent starts per minute across the build.
    pub rate_limit_per_minute: Option<u32>,
    /// Retry policy for retryable agent failures.
    pub retry: RetryConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: 4,
            budget_limit_usd: None,
            rate_limit_per_minute: None,
            retry: RetryConfig::default(),
        }
    }
}

impl From<&Config> for DispatcherConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_concurrent_agents: config.orchestrator.max_concurrent_agents,
            budget_limit_usd: config.orchestrator.budget_limit_usd,
            rate_limit_per_minute: config.orchestrator.agent_rate_limit_per_minute,
            retry: config.retry.clone(),
        }
    }
}

/// Live view of a build's agent tasks, readable while they run.
#[derive(Debug, Default)]
pub struct TaskBoard {
    tasks: Mutex<Vec<AgentTask>>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&self, tasks: Vec<AgentTask>) {
        *self.tasks.lock().unwrap_or_else(PoisonError::into_inner) = tasks;
    }

    fn update<R>(&self, idx: usize, f: impl FnOnce(&mut AgentTask) -> R) -> Option<R> {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.get_mut(idx).map(f)
    }

    fn get(&self, idx: usize) -> Option<AgentTask> {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.get(idx).cloned()
    }

    /// Copy of every task in partition order.
    pub fn snapshot(&self) -> Vec<AgentTask> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Fail every task that is still pending or running. Agents that keep
    /// going afterwards cannot move their task out of FAILED. Returns the
    /// agent ids that were failed.
    pub fn abandon_unfinished(&self, reason: &str) -> Vec<String> {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks
            .iter_mut()
            .filter(|t| !t.status.is_terminal())
            .map(|t| {
                t.mark_failed(AgentFailure::permanent(reason));
                t.agent_id.clone()
            })
            .collect()
    }

    /// Number of tasks currently running.
    pub fn running(&self) -> usize {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.iter().filter(|t| t.status == AgentTaskStatus::Running).count()
    }
}

/// Everything a dispatch needs from the enclosing build.
#[derive(Clone)]
pub struct DispatchContext {
    pub build_id: Uuid,
    pub sandbox: Arc<dyn Sandbox>,
    pub bus: Arc<ContextBus>,
    /// Cancelled on external cancel or phase timeout.
    pub cancel: CancellationToken,
    pub board: Arc<TaskBoard>,
}

#[derive(Default)]
struct PathLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PathLocks {
    fn lock_for(&self, path: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(path.to_string()).or_default())
    }
}

struct Budget {
    limit: Option<f64>,
    spent: Mutex<f64>,
    reported: AtomicBool,
}

impl Budget {
    fn new(limit: Option<f64>) -> Self {
        Self {
            limit,
            spent: Mutex::new(0.0),
            reported: AtomicBool::new(false),
        }
    }

    fn add(&self, cost: f64) {
        if cost > 0.0 {
            *self.spent.lock().unwrap_or_else(PoisonError::into_inner) += cost;
        }
    }

    fn spent(&self) -> f64 {
        *self.spent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `(spent, limit)` once the limit has been reached.
    fn exhausted(&self) -> Option<(f64, f64)> {
        let limit = self.limit?;
        let spent = self.spent();
        (spent >= limit).then_some((spent, limit))
    }
}

struct Shared {
    build_id: Uuid,
    runner: Arc<dyn AgentRunner>,
    sandbox: Arc<dyn Sandbox>,
    bus: Arc<ContextBus>,
    cancel: CancellationToken,
    board: Arc<TaskBoard>,
    progress: Arc<ProgressBus>,
    scrubber: Arc<SecretScrubber>,
    path_locks: PathLocks,
    limiter: Option<DefaultDirectRateLimiter>,
    budget: Budget,
    retry: RetryConfig,
}

impl Shared {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.retry.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.retry.max_backoff_ms))
            .with_max_elapsed_time(None)
            .build()
    }

    fn emit_status(&self, idx: usize) {
        let Some(task) = self.board.get(idx) else {
            return;
        };
        match task.status {
            AgentTaskStatus::Failed => warn!(
                build_id = %self.build_id,
                agent_id = %task.agent_id,
                reason = task.failure.as_ref().map_or("", |f| f.reason.as_str()),
                "agent task failed"
            ),
            status => info!(
                build_id = %self.build_id,
                agent_id = %task.agent_id,
                status = %status,
                "agent task status changed"
            ),
        }
        self.progress.emit(
            self.build_id,
            ProgressPayload::AgentStatusChanged {
                agent_id: task.agent_id.clone(),
                partition: task.assigned_partition.name.clone(),
                status: task.status,
                reason: task.failure.as_ref().map(|f| f.reason.clone()),
            },
        );
    }

    fn fail(&self, idx: usize, failure: AgentFailure) {
        let failure = AgentFailure {
            reason: self.scrubber.scrub(&failure.reason),
            retryable: failure.retryable,
        };
        self.board.update(idx, |t| t.mark_failed(failure));
        self.emit_status(idx);
    }

    fn skip_for_budget(&self, idx: usize, spent: f64, limit: f64) {
        if !self.budget.reported.swap(true, Ordering::SeqCst) {
            warn!(build_id = %self.build_id, spent_usd = spent, limit_usd = limit, "budget exceeded; not starting remaining agents");
            self.progress.emit(
                self.build_id,
                ProgressPayload::BudgetExceeded {
                    spent_usd: spent,
                    limit_usd: limit,
                },
            );
        }
        self.fail(idx, AgentFailure::permanent("budget exceeded"));
    }
}

/// Handle given to an [`AgentRunner`] for one partition.
struct DispatchedAgent {
    shared: Arc<Shared>,
    idx: usize,
    agent_id: String,
    partition: WorkPartition,
}

impl DispatchedAgent {
    fn checked_path(&self, path: &str) -> BuildResult<String> {
        normalize_path(path).ok_or_else(|| BuildError::Sandbox(format!("path escapes workspace: {path}")))
    }

    fn ensure_live(&self) -> BuildResult<()> {
        if self.shared.cancel.is_cancelled() {
            Err(BuildError::CancellationRequested)
        } else {
            Ok(())
        }
    }

    /// Apply one write or delete as an atomic step under the path's lock.
    async fn apply(&self, path: &str, content: Option<&str>) -> BuildResult<()> {
        self.ensure_live()?;
        let path = self.checked_path(path)?;
        let lock = self.shared.path_locks.lock_for(&path);
        let _guard = lock.lock().await;
        // Cancellation may have landed while waiting for the lock.
        self.ensure_live()?;

        match content {
            Some(content) => self.shared.sandbox.write_file(&path, content).await?,
            None => self.shared.sandbox.delete_file(&path).await?,
        }

        let change = match content {
            Some(content) => FileChange::write(path.clone(), content),
            None => FileChange::delete(path.clone()),
        };
        let first_touch = self
            .shared
            .board
            .update(self.idx, |t| {
                let first = !t.output.iter().any(|c| c.path == path);
                t.output.push(change);
                first
            })
            .unwrap_or(false);
        debug!(
            build_id = %self.shared.build_id,
            agent_id = %self.agent_id,
            path = %path,
            deleted = content.is_none(),
            "agent wrote file"
        );

        if first_touch && content.is_some() {
            self.publish(Discovery::file_created(path));
        }
        Ok(())
    }
}

#[async_trait]
impl AgentContext for DispatchedAgent {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn partition(&self) -> &WorkPartition {
        &self.partition
    }

    fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    fn query(&self, task_filter: Option<&str>, exclude_self: bool) -> Vec<ContextEntry> {
        self.shared.bus.query(&self.agent_id, task_filter, exclude_self)
    }

    fn publish(&self, discovery: Discovery) {
        self.shared.board.update(self.idx, |t| t.discoveries.push(discovery.clone()));
        self.shared.bus.publish(&self.agent_id, discovery);
    }

    async fn read_file(&self, path: &str) -> BuildResult<Option<String>> {
        let path = self.checked_path(path)?;
        self.shared.sandbox.read_file(&path).await
    }

    async fn write_file(&self, path: &str, content: &str) -> BuildResult<()> {
        self.apply(path, Some(content)).await
    }

    async fn delete_file(&self, path: &str) -> BuildResult<()> {
        self.apply(path, None).await
    }
}

async fn run_agent(shared: Arc<Shared>, idx: usize, agent_id: String, partition: WorkPartition) {
    shared.bus.register_agent(&agent_id, &partition.description);
    shared.board.update(idx, AgentTask::mark_running);
    shared.emit_status(idx);

    let ctx = DispatchedAgent {
        shared: Arc::clone(&shared),
        idx,
        agent_id: agent_id.clone(),
        partition,
    };
    let max_attempts = shared.retry.max_retries.saturating_add(1);
    let mut backoff = shared.backoff();
    let mut attempt = 0;

    let result = loop {
        attempt += 1;
        shared.board.update(idx, |t| t.attempts = attempt);

        if let Some(limiter) = &shared.limiter {
            tokio::select! {
                () = limiter.until_ready() => {}
                () = shared.cancel.cancelled() => {
                    break Err(AgentFailure::permanent("cancelled before start"));
                }
            }
        }

        match shared.runner.run(&ctx).await {
            Ok(outcome) => break Ok(outcome),
            Err(failure) => {
                let can_retry = failure.retryable && attempt < max_attempts && !shared.cancel.is_cancelled();
                if !can_retry {
                    break Err(failure);
                }
                let delay = backoff
                    .next_backoff()
                    .unwrap_or_else(|| Duration::from_millis(shared.retry.max_backoff_ms));
                warn!(
                    build_id = %shared.build_id,
                    agent_id = %agent_id,
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    reason = %shared.scrubber.scrub(&failure.reason),
                    "retrying agent after transient failure"
                );
                shared.progress.emit(
                    shared.build_id,
                    ProgressPayload::AgentRetrying {
                        agent_id: agent_id.clone(),
                        attempt,
                        max_attempts,
                    },
                );
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = shared.cancel.cancelled() => break Err(failure),
                }
            }
        }
    };

    match result {
        Ok(outcome) => {
            shared.budget.add(outcome.cost_usd);
            shared.board.update(idx, |t| {
                t.cost_usd += outcome.cost_usd;
                t.mark_completed(outcome.summary);
            });
            shared.emit_status(idx);
        }
        Err(failure) => shared.fail(idx, failure),
    }
}

/// Spawns agents for partitions with bounded concurrency.
pub struct AgentDispatcher {
    runner: Arc<dyn AgentRunner>,
    progress: Arc<ProgressBus>,
    scrubber: Arc<SecretScrubber>,
    config: DispatcherConfig,
}

impl AgentDispatcher {
    pub fn new(
        runner: Arc<dyn AgentRunner>,
        progress: Arc<ProgressBus>,
        scrubber: Arc<SecretScrubber>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            runner,
            progress,
            scrubber,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    fn limiter(&self) -> Option<DefaultDirectRateLimiter> {
        let per_minute = NonZeroU32::new(self.config.rate_limit_per_minute?)?;
        Some(RateLimiter::direct(Quota::per_minute(per_minute)))
    }

    /// Run one agent per partition and wait for all of them to reach a
    /// terminal status.
    ///
    /// Individual failures are isolated. When every task fails and the build
    /// was not cancelled, returns [`BuildError::AllAgentsFailed`]; the tasks
    /// remain readable from the context's board either way.
    pub async fn dispatch(&self, ctx: &DispatchContext, partitions: Vec<WorkPartition>) -> BuildResult<Vec<AgentTask>> {
        let mut seen_ids = HashSet::new();
        let tasks: Vec<AgentTask> = partitions
            .into_iter()
            .enumerate()
            .map(|(idx, partition)| {
                let mut task = AgentTask::new(partition);
                if !seen_ids.insert(task.agent_id.clone()) {
                    task.agent_id = format!("{}-{idx}", task.agent_id);
                    seen_ids.insert(task.agent_id.clone());
                }
                task
            })
            .collect();
        ctx.board.reset(tasks.clone());

        info!(
            build_id = %ctx.build_id,
            agents = tasks.len(),
            max_concurrent = self.config.max_concurrent_agents,
            runner = self.runner.name(),
            "dispatching agents"
        );

        let shared = Arc::new(Shared {
            build_id: ctx.build_id,
            runner: Arc::clone(&self.runner),
            sandbox: Arc::clone(&ctx.sandbox),
            bus: Arc::clone(&ctx.bus),
            cancel: ctx.cancel.clone(),
            board: Arc::clone(&ctx.board),
            progress: Arc::clone(&self.progress),
            scrubber: Arc::clone(&self.scrubber),
            path_locks: PathLocks::default(),
            limiter: self.limiter(),
            budget: Budget::new(self.config.budget_limit_usd),
            retry: self.config.retry.clone(),
        });

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_agents.max(1)));
        let mut handles = Vec::with_capacity(tasks.len());

        for (idx, task) in tasks.iter().enumerate() {
            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                () = ctx.cancel.cancelled() => break,
            };

            if let Some((spent, limit)) = shared.budget.exhausted() {
                drop(permit);
                shared.skip_for_budget(idx, spent, limit);
                continue;
            }

            let shared = Arc::clone(&shared);
            let agent_id = task.agent_id.clone();
            let partition = task.assigned_partition.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                run_agent(shared, idx, agent_id, partition).await;
            });
            handles.push((idx, handle));
        }

        for (idx, handle) in handles {
            if let Err(e) = handle.await {
                error!(build_id = %ctx.build_id, error = %e, "agent task panicked");
                shared.fail(idx, AgentFailure::permanent(format!("agent task panicked: {e}")));
            }
        }

        for idx in 0..tasks.len() {
            let pending = shared
                .board
                .get(idx)
                .is_some_and(|t| t.status == AgentTaskStatus::Pending);
            if pending {
                shared.fail(idx, AgentFailure::permanent("cancelled before start"));
            }
        }

        let tasks = ctx.board.snapshot();
        let failed = tasks.iter().filter(|t| t.status == AgentTaskStatus::Failed).count();
        info!(
            build_id = %ctx.build_id,
            completed = tasks.len() - failed,
            failed,
            spent_usd = shared.budget.spent(),
            "dispatch finished"
        );

        if !tasks.is_empty() && failed == tasks.len() && !ctx.cancel.is_cancelled() {
            return Err(BuildError::AllAgentsFailed { failed });
        }
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::agents::{MockAgentRunner, AgentStep};
    use crate::adapters::sandbox::InMemorySandbox;
    use crate::domain::models::DiscoveryKind;

    fn context() -> (DispatchContext, Arc<InMemorySandbox>) {
        let sandbox = Arc::new(InMemorySandbox::new("test"));
        let build_id = Uuid::new_v4();
        let ctx = DispatchContext {
            build_id,
            sandbox: sandbox.clone(),
            bus: Arc::new(ContextBus::new(build_id)),
            cancel: CancellationToken::new(),
            board: Arc::new(TaskBoard::new()),
        };
        (ctx, sandbox)
    }

    fn dispatcher(runner: MockAgentRunner, config: DispatcherConfig) -> AgentDispatcher {
        AgentDispatcher::new(
            Arc::new(runner),
            Arc::new(ProgressBus::default()),
            Arc::new(SecretScrubber::new()),
            config,
        )
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        }
    }

    #[tokio::test]
    async fn isolated_failures_do_not_abort_siblings() {
        let runner = MockAgentRunner::new()
            .with_script("api", vec![AgentStep::write("routes/health.ts", "export const health = 1;\n")])
            .with_failure("tests", "model refused");
        let (ctx, sandbox) = context();
        let tasks = dispatcher(runner, DispatcherConfig::default())
            .dispatch(
                &ctx,
                vec![WorkPartition::new("api", "backend"), WorkPartition::new("tests", "tests")],
            )
            .await
            .unwrap();

        assert_eq!(tasks[0].status, AgentTaskStatus::Completed);
        assert_eq!(tasks[1].status, AgentTaskStatus::Failed);
        assert_eq!(tasks[0].output.len(), 1);
        assert!(sandbox.contains("routes/health.ts"));
        assert_eq!(ctx.bus.query("x", None, false)[0].kind, DiscoveryKind::FileCreated);
    }

    #[tokio::test]
    async fn all_failed_is_surfaced() {
        let runner = MockAgentRunner::new()
            .with_failure("a", "boom")
            .with_failure("b", "boom");
        let (ctx, _) = context();
        let err = dispatcher(runner, DispatcherConfig::default())
            .dispatch(&ctx, vec![WorkPartition::new("a", "a"), WorkPartition::new("b", "b")])
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::AllAgentsFailed { failed: 2 }));
        assert_eq!(ctx.board.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let runner = MockAgentRunner::new()
            .with_transient_failures("a", 2)
            .with_script("a", vec![AgentStep::write("a.ts", "a")]);
        let (ctx, _) = context();
        let config = DispatcherConfig {
            retry: fast_retry(),
            ..DispatcherConfig::default()
        };
        let tasks = dispatcher(runner, config)
            .dispatch(&ctx, vec![WorkPartition::new("a", "a")])
            .await
            .unwrap();
        assert_eq!(tasks[0].status, AgentTaskStatus::Completed);
        assert_eq!(tasks[0].attempts, 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let runner = MockAgentRunner::new()
            .with_transient_failures("a", 5)
            .with_script("b", vec![]);
        let (ctx, _) = context();
        let config = DispatcherConfig {
            retry: fast_retry(),
            ..DispatcherConfig::default()
        };
        let tasks = dispatcher(runner, config)
            .dispatch(&ctx, vec![WorkPartition::new("a", "a"), WorkPartition::new("b", "b")])
            .await
            .unwrap();
        assert_eq!(tasks[0].status, AgentTaskStatus::Failed);
        assert_eq!(tasks[0].attempts, 3);
        assert!(tasks[0].failure.as_ref().unwrap().retryable);
    }

    #[tokio::test]
    async fn budget_stops_new_agents() {
        let runner = MockAgentRunner::new()
            .with_script("a", vec![])
            .with_cost("a", 1.5)
            .with_script("b", vec![]);
        let (ctx, _) = context();
        let config = DispatcherConfig {
            max_concurrent_agents: 1,
            budget_limit_usd: Some(1.0),
            ..DispatcherConfig::default()
        };
        let tasks = dispatcher(runner, config)
            .dispatch(&ctx, vec![WorkPartition::new("a", "a"), WorkPartition::new("b", "b")])
            .await
            .unwrap();
        assert_eq!(tasks[0].status, AgentTaskStatus::Completed);
        assert_eq!(tasks[1].status, AgentTaskStatus::Failed);
        assert_eq!(tasks[1].failure.as_ref().unwrap().reason, "budget exceeded");
    }

    #[tokio::test]
    async fn no_writes_after_cancellation() {
        let runner = MockAgentRunner::new().with_script(
            "slow",
            vec![
                AgentStep::write("first.ts", "1"),
                AgentStep::sleep(Duration::from_millis(200)),
                AgentStep::write("second.ts", "2"),
            ],
        );
        let (ctx, sandbox) = context();
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let tasks = dispatcher(runner, DispatcherConfig::default())
            .dispatch(&ctx, vec![WorkPartition::new("slow", "slow")])
            .await
            .unwrap();

        assert!(sandbox.contains("first.ts"));
        assert!(!sandbox.contains("second.ts"));
        assert_eq!(tasks[0].status, AgentTaskStatus::Failed);
        assert_eq!(tasks[0].output.len(), 1);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let mut runner = MockAgentRunner::new();
        let mut partitions = Vec::new();
        for n in 0..6 {
            let id = format!("p{n}");
            runner = runner.with_script(&id, vec![AgentStep::sleep(Duration::from_millis(20))]);
            partitions.push(WorkPartition::new(id, "work"));
        }
        let peak = runner.peak_concurrency();
        let (ctx, _) = context();
        let config = DispatcherConfig {
            max_concurrent_agents: 2,
            ..DispatcherConfig::default()
        };
        dispatcher(runner, config).dispatch(&ctx, partitions).await.unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn duplicate_partition_ids_get_unique_agents() {
        let runner = MockAgentRunner::new();
        let (ctx, _) = context();
        let tasks = dispatcher(runner, DispatcherConfig::default())
            .dispatch(&ctx, vec![WorkPartition::new("x", "a"), WorkPartition::new("x", "b")])
            .await
            .unwrap();
        assert_ne!(tasks[0].agent_id, tasks[1].agent_id);
    }

    #[test]
    fn abandoning_fails_only_unfinished_tasks() {
        let board = TaskBoard::new();
        let mut done = AgentTask::new(WorkPartition::new("done", "done"));
        done.mark_running();
        done.mark_completed(None);
        let mut running = AgentTask::new(WorkPartition::new("running", "running"));
        running.mark_running();
        let pending = AgentTask::new(WorkPartition::new("pending", "pending"));
        board.reset(vec![done, running, pending]);

        let abandoned = board.abandon_unfinished("cancelled");
        assert_eq!(abandoned, vec!["agent-running".to_string(), "agent-pending".to_string()]);

        board.update(1, |t| t.mark_completed(None));
        let tasks = board.snapshot();
        assert_eq!(tasks[0].status, AgentTaskStatus::Completed);
        assert!(tasks[1..].iter().all(|t| t.status == AgentTaskStatus::Failed));
        assert_eq!(tasks[1].failure.as_ref().map(|f| f.reason.as_str()), Some("cancelled"));
    }
}
