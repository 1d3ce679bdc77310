//! Build state machine.
//!
//! Drives one session through
//! INTENT_LOCK -> INITIALIZATION -> PARALLEL_BUILD -> INTEGRATION_CHECK ->
//! FUNCTIONAL_TEST -> INTENT_SATISFACTION -> DEMO -> DONE, with FAILED or
//! CANCELLED reachable from any non-terminal phase.
//!
//! Every phase runs under its own deadline and a child cancellation token.
//! On deadline or external cancel the token is cancelled and the phase gets
//! `cancel_grace` to wind down cooperatively before the session terminates.
//! The sandbox is closed and the terminal report persisted on every path.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::models::{
    BuildPhase, BuildRequest, BuildSession, Config, IntentContract, PhaseTimeouts, TerminalReport,
    WorkPartition, WorkspaceSnapshot,
};
use crate::domain::ports::{ReportStore, Sandbox, SandboxProvider, WorkPlanner};
use crate::infrastructure::logging::SecretScrubber;
use crate::services::agent_dispatcher::{AgentDispatcher, DispatchContext, TaskBoard};
use crate::services::context_bus::ContextBus;
use crate::services::intent_contract::IntentContractManager;
use crate::services::merge_resolver::MergeResolver;
use crate::services::progress_bus::{ProgressBus, ProgressPayload};
use crate::services::verification::VerificationSwarm;
use crate::services::work_planner::partitions_for;

/// Session state shared between the running pipeline and observers.
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<Mutex<BuildSession>>,
    board: Arc<TaskBoard>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn new(session: BuildSession) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            board: Arc::new(TaskBoard::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn build_id(&self) -> uuid::Uuid {
        self.with(|s| s.id)
    }

    /// Copy of the session, with live agent task state while agents run.
    pub fn snapshot(&self) -> BuildSession {
        let mut session = self.with(|s| s.clone());
        if session.phase() == BuildPhase::ParallelBuild {
            session.agent_tasks = self.board.snapshot();
        }
        session
    }

    pub fn phase(&self) -> BuildPhase {
        self.with(|s| s.phase())
    }

    /// Request cancellation. Returns false when the session already ended.
    pub fn cancel(&self) -> bool {
        if self.with(|s| s.is_terminal()) {
            return false;
        }
        self.cancel.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn with<R>(&self, f: impl FnOnce(&mut BuildSession) -> R) -> R {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut session)
    }
}

/// Collaborators the state machine drives.
pub struct PipelineComponents {
    pub contracts: IntentContractManager,
    pub planner: Arc<dyn WorkPlanner>,
    pub sandboxes: Arc<dyn SandboxProvider>,
    pub dispatcher: AgentDispatcher,
    pub merger: MergeResolver,
    pub verifier: VerificationSwarm,
    pub store: Arc<dyn ReportStore>,
}

/// Per-run resources acquired along the way.
#[derive(Default)]
struct RunState {
    sandbox: Option<Arc<dyn Sandbox>>,
    baseline: WorkspaceSnapshot,
    bus: Option<Arc<ContextBus>>,
    partitions: Vec<WorkPartition>,
}

pub struct BuildStateMachine {
    components: PipelineComponents,
    progress: Arc<ProgressBus>,
    scrubber: Arc<SecretScrubber>,
    timeouts: PhaseTimeouts,
    cancel_grace: Duration,
}

impl BuildStateMachine {
    pub fn new(
        components: PipelineComponents,
        progress: Arc<ProgressBus>,
        scrubber: Arc<SecretScrubber>,
        config: &Config,
    ) -> Self {
        Self {
            components,
            progress,
            scrubber,
            timeouts: config.orchestrator.phase_timeouts.clone(),
            cancel_grace: config.orchestrator.cancel_grace(),
        }
    }

    pub fn progress(&self) -> &Arc<ProgressBus> {
        &self.progress
    }

    pub fn contracts(&self) -> &IntentContractManager {
        &self.components.contracts
    }

    /// Run the session to a terminal phase and return its persisted report.
    ///
    /// `contract` is the already-derived (unlocked) contract when the caller
    /// validated the prompt up front; otherwise it is derived here.
    pub async fn run(&self, handle: &SessionHandle, contract: Option<IntentContract>) -> TerminalReport {
        let build_id = handle.build_id();
        let project_id = handle.with(|s| s.project_id.clone());
        info!(build_id = %build_id, project_id = %project_id, "build started");
        self.progress.emit(build_id, ProgressPayload::BuildStarted { project_id });

        let mut state = RunState::default();
        let outcome = self.drive(handle, &mut state, contract).await;

        if let Some(sandbox) = state.sandbox.take() {
            let sandbox_id = sandbox.id().to_string();
            if let Err(e) = self.components.sandboxes.close(sandbox).await {
                warn!(build_id = %build_id, sandbox_id = %sandbox_id, error = %e, "failed to close sandbox");
            }
            self.progress.emit(build_id, ProgressPayload::SandboxClosed { sandbox_id });
        }

        let from = handle.phase();
        let terminal = match outcome {
            Ok(()) => handle.with(|s| s.transition_to(BuildPhase::Done).map(|()| BuildPhase::Done)),
            Err(err) => {
                if err.is_cancellation() {
                    info!(build_id = %build_id, phase = %from, "build cancelled");
                } else {
                    warn!(build_id = %build_id, phase = %from, error = %self.scrubber.scrub(&err.to_string()), "build failed");
                }
                handle.with(|s| s.terminate(err))
            }
        };
        match terminal {
            Ok(to) => {
                self.progress.emit(build_id, ProgressPayload::PhaseChanged { from, to });
            }
            Err(e) => error!(build_id = %build_id, error = %e, "could not record terminal phase"),
        }

        let session = handle.with(|s| s.clone());
        let report = TerminalReport::from_session(&session, |text| self.scrubber.scrub(text));
        if let Err(e) = self.components.store.save(&report).await {
            error!(build_id = %build_id, error = %e, "failed to persist terminal report");
        }

        info!(
            build_id = %build_id,
            phase = %report.phase,
            partial = report.partial,
            duration = %report.duration,
            cost_usd = report.total_cost_usd,
            "build finished"
        );
        self.progress.emit(
            build_id,
            ProgressPayload::BuildFinished {
                phase: report.phase,
                partial: report.partial,
                failure_reason: report.failure_reason.clone(),
            },
        );
        report
    }

    /// Move the session to `to` and announce it.
    fn enter(&self, handle: &SessionHandle, to: BuildPhase) -> BuildResult<()> {
        if handle.is_cancelled() {
            return Err(BuildError::CancellationRequested);
        }
        let from = handle.phase();
        handle.with(|s| s.transition_to(to))?;
        info!(build_id = %handle.build_id(), from = %from, to = %to, "phase transition");
        self.progress.emit(handle.build_id(), ProgressPayload::PhaseChanged { from, to });
        Ok(())
    }

    /// Run `work` under the phase deadline and the session's cancel token.
    ///
    /// `phase_token` must be the token the work observes; it is cancelled on
    /// deadline or external cancel, after which the work gets the grace
    /// period to finish its current step.
    async fn within_deadline<T, F>(
        &self,
        handle: &SessionHandle,
        phase: BuildPhase,
        phase_token: &CancellationToken,
        work: F,
    ) -> BuildResult<T>
    where
        F: Future<Output = BuildResult<T>>,
    {
        let deadline = self.timeouts.for_phase(phase);
        tokio::pin!(work);
        let expired = async {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        let err = tokio::select! {
            biased;
            () = handle.cancel.cancelled() => BuildError::CancellationRequested,
            result = &mut work => return result,
            () = expired => {
                warn!(build_id = %handle.build_id(), phase = %phase, "phase deadline exceeded");
                BuildError::PhaseTimeout(phase)
            }
        };

        phase_token.cancel();
        if tokio::time::timeout(self.cancel_grace, &mut work).await.is_err() {
            warn!(
                build_id = %handle.build_id(),
                phase = %phase,
                grace_ms = u64::try_from(self.cancel_grace.as_millis()).unwrap_or(u64::MAX),
                "phase did not wind down within the grace period"
            );
        }
        Err(err)
    }

    async fn drive(
        &self,
        handle: &SessionHandle,
        state: &mut RunState,
        contract: Option<IntentContract>,
    ) -> BuildResult<()> {
        let build_id = handle.build_id();
        let request = handle.with(|s| BuildRequest::new(s.prompt.clone(), s.project_id.clone(), s.user_id.clone()));

        // INTENT_LOCK
        let token = handle.cancel.child_token();
        let contract = self
            .within_deadline(handle, BuildPhase::IntentLock, &token, async {
                let mut contract = match contract {
                    Some(contract) => contract,
                    None => self.components.contracts.create_contract(&request.prompt)?,
                };
                contract.lock()?;
                Ok(contract)
            })
            .await?;
        let criteria = contract.criteria().len();
        handle.with(|s| s.set_intent_contract(contract.clone()))?;
        self.progress.emit(build_id, ProgressPayload::ContractLocked { criteria });

        // INITIALIZATION
        self.enter(handle, BuildPhase::Initialization)?;
        let token = handle.cancel.child_token();
        self.within_deadline(handle, BuildPhase::Initialization, &token, async {
            let sandbox = self.components.sandboxes.open(&request.project_id).await?;
            let sandbox_id = sandbox.id().to_string();
            state.sandbox = Some(Arc::clone(&sandbox));
            info!(build_id = %build_id, sandbox_id = %sandbox_id, provider = self.components.sandboxes.name(), "sandbox opened");
            self.progress.emit(build_id, ProgressPayload::SandboxOpened { sandbox_id });

            state.baseline = sandbox.snapshot().await?;
            state.bus = Some(Arc::new(ContextBus::new(build_id).with_progress(Arc::clone(&self.progress))));

            let plan = self.components.planner.plan(&request, &contract).await?;
            state.partitions = partitions_for(&plan, &contract);
            info!(
                build_id = %build_id,
                planner = self.components.planner.name(),
                partitions = state.partitions.len(),
                baseline_files = state.baseline.len(),
                "work partitioned"
            );
            self.progress.emit(
                build_id,
                ProgressPayload::TasksPartitioned {
                    count: state.partitions.len(),
                },
            );
            Ok(())
        })
        .await?;

        let sandbox = state
            .sandbox
            .clone()
            .ok_or_else(|| BuildError::Sandbox("sandbox was not opened".to_string()))?;
        let bus = state
            .bus
            .clone()
            .ok_or_else(|| BuildError::Sandbox("context bus was not created".to_string()))?;

        // PARALLEL_BUILD
        self.enter(handle, BuildPhase::ParallelBuild)?;
        let token = handle.cancel.child_token();
        let ctx = DispatchContext {
            build_id,
            sandbox: Arc::clone(&sandbox),
            bus,
            cancel: token.clone(),
            board: Arc::clone(&handle.board),
        };
        let partitions = std::mem::take(&mut state.partitions);
        let dispatched = self
            .within_deadline(
                handle,
                BuildPhase::ParallelBuild,
                &token,
                self.components.dispatcher.dispatch(&ctx, partitions),
            )
            .await;
        if dispatched.is_err() {
            let abandoned = handle.board.abandon_unfinished("cancelled");
            if !abandoned.is_empty() {
                warn!(build_id = %build_id, agents = ?abandoned, "agents still running after the grace period were failed");
            }
        }
        handle.with(|s| s.agent_tasks = handle.board.snapshot());
        let tasks = dispatched?;

        // INTEGRATION_CHECK
        self.enter(handle, BuildPhase::IntegrationCheck)?;
        let token = handle.cancel.child_token();
        let merge_report = self
            .within_deadline(
                handle,
                BuildPhase::IntegrationCheck,
                &token,
                self.components.merger.merge(sandbox.as_ref(), &state.baseline, &tasks),
            )
            .await?;
        let unresolved = merge_report.unresolved_paths();
        self.progress.emit(
            build_id,
            ProgressPayload::MergeCompleted {
                conflicts: merge_report.conflicts.len(),
                unresolved: unresolved.len(),
                success: merge_report.success,
            },
        );
        handle.with(|s| s.set_merge_report(merge_report));
        if !unresolved.is_empty() {
            return Err(BuildError::UnresolvedMergeConflict { paths: unresolved });
        }

        // FUNCTIONAL_TEST
        self.enter(handle, BuildPhase::FunctionalTest)?;
        let token = handle.cancel.child_token();
        let (merged, verification) = self
            .within_deadline(handle, BuildPhase::FunctionalTest, &token, async {
                let merged = sandbox.snapshot().await?;
                let report = self.components.verifier.verify(&merged, sandbox.as_ref()).await;
                Ok((merged, report))
            })
            .await?;
        for check in &verification.checks {
            self.progress.emit(
                build_id,
                ProgressPayload::CheckCompleted {
                    name: check.name.clone(),
                    passed: check.passed,
                    blocking: check.blocking,
                },
            );
        }
        self.progress.emit(
            build_id,
            ProgressPayload::VerificationCompleted {
                passed: verification.overall_passed,
                checks: verification.checks.len(),
            },
        );
        let failed_checks = verification.failed_blocking();
        handle.with(|s| s.set_verification_report(verification));
        if !failed_checks.is_empty() {
            return Err(BuildError::VerificationFailed { failed_checks });
        }

        // INTENT_SATISFACTION
        self.enter(handle, BuildPhase::IntentSatisfaction)?;
        let token = handle.cancel.child_token();
        let satisfaction = self
            .within_deadline(handle, BuildPhase::IntentSatisfaction, &token, async {
                Ok(self.components.contracts.evaluate(&contract, &merged))
            })
            .await?;
        let satisfied = satisfaction.values().filter(|passed| **passed).count();
        self.progress.emit(
            build_id,
            ProgressPayload::IntentEvaluated {
                satisfied,
                total: satisfaction.len(),
            },
        );
        let unmet: Vec<String> = satisfaction
            .iter()
            .filter(|(_, passed)| !**passed)
            .map(|(id, _)| id.clone())
            .collect();
        handle.with(|s| s.intent_satisfaction = satisfaction);
        if !unmet.is_empty() {
            return Err(BuildError::IntentNotSatisfied { unmet });
        }

        // DEMO
        self.enter(handle, BuildPhase::Demo)?;
        let token = handle.cancel.child_token();
        let files = self
            .within_deadline(handle, BuildPhase::Demo, &token, async {
                Ok(sandbox.snapshot().await?.len())
            })
            .await?;
        info!(build_id = %build_id, files, "demo ready");
        self.progress.emit(build_id, ProgressPayload::DemoReady { files });

        if handle.is_cancelled() {
            return Err(BuildError::CancellationRequested);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::agents::{MockAgentRunner, AgentStep};
    use crate::adapters::sandbox::InMemorySandboxProvider;
    use crate::adapters::store::InMemoryReportStore;
    use crate::domain::errors::ErrorKind;
    use crate::domain::models::AgentTaskStatus;
    use crate::services::agent_dispatcher::DispatcherConfig;
    use crate::services::work_planner::CriteriaPlanner;

    fn machine(runner: MockAgentRunner, store: Arc<InMemoryReportStore>) -> BuildStateMachine {
        let progress = Arc::new(ProgressBus::default());
        let scrubber = Arc::new(SecretScrubber::new());
        let components = PipelineComponents {
            contracts: IntentContractManager::default(),
            planner: Arc::new(CriteriaPlanner),
            sandboxes: Arc::new(InMemorySandboxProvider::new()),
            dispatcher: AgentDispatcher::new(
                Arc::new(runner),
                Arc::clone(&progress),
                Arc::clone(&scrubber),
                DispatcherConfig::default(),
            ),
            merger: MergeResolver::default(),
            verifier: VerificationSwarm::new(),
            store,
        };
        BuildStateMachine::new(components, progress, scrubber, &Config::default())
    }

    fn handle(prompt: &str) -> SessionHandle {
        SessionHandle::new(BuildSession::new(&BuildRequest::new(prompt, "proj", "user")))
    }

    #[tokio::test]
    async fn happy_path_reaches_done() {
        let runner = MockAgentRunner::new().with_script(
            "sc-001",
            vec![AgentStep::write("routes/health.ts", "export const health = () => 'ok';\n")],
        );
        let store = Arc::new(InMemoryReportStore::new());
        let sm = machine(runner, Arc::clone(&store));
        let handle = handle("add a health-check endpoint");

        let report = sm.run(&handle, None).await;
        assert_eq!(report.phase, BuildPhase::Done);
        assert_eq!(report.intent_satisfaction.get("SC-001"), Some(&true));
        assert!(store.get(report.build_id).await.unwrap().is_some());

        let phases: Vec<BuildPhase> = handle.snapshot().history().iter().map(|t| t.to).collect();
        assert_eq!(&phases[..6], &BuildPhase::PIPELINE[1..]);
        assert_eq!(phases.last(), Some(&BuildPhase::Done));
    }

    #[tokio::test]
    async fn unmet_intent_fails_after_verification() {
        let runner = MockAgentRunner::new().with_script("sc-001", vec![AgentStep::write("a.ts", "export {};\n")]);
        let sm = machine(runner, Arc::new(InMemoryReportStore::new()));
        let report = sm.run(&handle("add a health-check endpoint"), None).await;
        assert_eq!(report.phase, BuildPhase::Failed);
        assert!(report.verification_report.is_some());
        assert_eq!(report.intent_satisfaction.get("SC-001"), Some(&false));
        assert_eq!(report.error_kind, Some(ErrorKind::IntentNotSatisfied));
    }

    #[tokio::test]
    async fn all_failed_skips_merge() {
        let runner = MockAgentRunner::new().with_failure("sc-001", "model refused");
        let sm = machine(runner, Arc::new(InMemoryReportStore::new()));
        let report = sm.run(&handle("add a health-check endpoint"), None).await;
        assert_eq!(report.phase, BuildPhase::Failed);
        assert!(report.merge_report.is_none());
        assert!(report.verification_report.is_none());
        assert_eq!(report.tasks[0].status, AgentTaskStatus::Failed);
    }

    #[tokio::test]
    async fn cancel_before_start_ends_cancelled() {
        let sm = machine(MockAgentRunner::new(), Arc::new(InMemoryReportStore::new()));
        let handle = handle("add a health-check endpoint");
        assert!(handle.cancel());
        let report = sm.run(&handle, None).await;
        assert_eq!(report.phase, BuildPhase::Cancelled);
        assert!(!handle.cancel());
    }
}
