//! Build orchestrator facade: the inbound Start Build / Cancel Build surface.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::models::{BuildRequest, BuildSession, Config, TerminalReport};
use crate::domain::ports::{AgentRunner, ReportStore, SandboxProvider, WorkPlanner};
use crate::infrastructure::logging::SecretScrubber;
use crate::services::agent_dispatcher::{AgentDispatcher, DispatcherConfig};
use crate::services::build_state_machine::{BuildStateMachine, PipelineComponents, SessionHandle};
use crate::services::intent_contract::IntentContractManager;
use crate::services::merge_resolver::MergeResolver;
use crate::services::progress_bus::{BuildSubscription, ProgressBus};
use crate::services::verification::VerificationSwarm;

struct ActiveBuild {
    handle: SessionHandle,
    finished: watch::Receiver<Option<TerminalReport>>,
}

type BuildMap = Arc<RwLock<HashMap<Uuid, ActiveBuild>>>;

/// Starts, tracks and cancels builds.
///
/// A build is tracked while it runs; once its terminal report is produced it
/// is dropped and later lookups go to the report store.
pub struct BuildOrchestrator {
    machine: Arc<BuildStateMachine>,
    store: Arc<dyn ReportStore>,
    builds: BuildMap,
}

impl BuildOrchestrator {
    pub fn new(machine: BuildStateMachine, store: Arc<dyn ReportStore>) -> Self {
        Self {
            machine: Arc::new(machine),
            store,
            builds: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Wire the full pipeline from configuration.
    pub fn from_config(
        config: &Config,
        runner: Arc<dyn AgentRunner>,
        planner: Arc<dyn WorkPlanner>,
        sandboxes: Arc<dyn SandboxProvider>,
        store: Arc<dyn ReportStore>,
    ) -> anyhow::Result<Self> {
        let progress = Arc::new(ProgressBus::default());
        let scrubber = Arc::new(SecretScrubber::new());
        let components = PipelineComponents {
            contracts: IntentContractManager::default(),
            planner,
            sandboxes,
            dispatcher: AgentDispatcher::new(
                runner,
                Arc::clone(&progress),
                Arc::clone(&scrubber),
                DispatcherConfig::from(config),
            ),
            merger: MergeResolver::new(config.merge.conflict_policy),
            verifier: VerificationSwarm::from_config(&config.verification)?,
            store: Arc::clone(&store),
        };
        let machine = BuildStateMachine::new(components, progress, scrubber, config);
        Ok(Self::new(machine, store))
    }

    pub fn progress(&self) -> &Arc<ProgressBus> {
        self.machine.progress()
    }

    /// Start a build and return its id.
    ///
    /// The prompt is validated before anything runs; one that yields no
    /// success criteria is rejected with [`BuildError::InvalidPrompt`].
    pub fn start(&self, request: BuildRequest) -> BuildResult<Uuid> {
        let contract = self
            .machine
            .contracts()
            .create_contract(&request.prompt)
            .map_err(|e| match e {
                BuildError::EmptyIntent => BuildError::InvalidPrompt(e.to_string()),
                other => other,
            })?;

        let session = BuildSession::new(&request);
        let build_id = session.id;
        let handle = SessionHandle::new(session);
        let (tx, rx) = watch::channel(None);

        self.builds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                build_id,
                ActiveBuild {
                    handle: handle.clone(),
                    finished: rx,
                },
            );

        info!(
            build_id = %build_id,
            project_id = %request.project_id,
            criteria = contract.criteria().len(),
            "build accepted"
        );

        let machine = Arc::clone(&self.machine);
        let builds = Arc::clone(&self.builds);
        tokio::spawn(async move {
            let report = machine.run(&handle, Some(contract)).await;
            let _ = tx.send(Some(report));
            builds
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&build_id);
            debug!(build_id = %build_id, "build no longer tracked");
        });
        Ok(build_id)
    }

    /// Request cancellation. True when a running build was signalled.
    pub fn cancel(&self, build_id: Uuid) -> bool {
        let builds = self.builds.read().unwrap_or_else(PoisonError::into_inner);
        let acknowledged = builds.get(&build_id).is_some_and(|b| b.handle.cancel());
        info!(build_id = %build_id, acknowledged, "cancel requested");
        acknowledged
    }

    /// Progress events for a build, replaying what was already emitted.
    pub fn subscribe(&self, build_id: Uuid) -> BuildSubscription {
        self.progress().subscribe(build_id)
    }

    /// Current state of a running build started by this orchestrator.
    pub fn status(&self, build_id: Uuid) -> Option<BuildSession> {
        let builds = self.builds.read().unwrap_or_else(PoisonError::into_inner);
        builds.get(&build_id).map(|b| b.handle.snapshot())
    }

    /// Number of builds currently tracked.
    pub fn tracked_builds(&self) -> usize {
        self.builds.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Ids of builds that have not reached a terminal phase.
    pub fn active_builds(&self) -> Vec<Uuid> {
        let builds = self.builds.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<Uuid> = builds
            .iter()
            .filter(|(_, b)| !b.handle.phase().is_terminal())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Wait for a build to finish and return its terminal report. Finished
    /// builds and builds not started here are looked up in the report store.
    pub async fn wait(&self, build_id: Uuid) -> BuildResult<TerminalReport> {
        let receiver = {
            let builds = self.builds.read().unwrap_or_else(PoisonError::into_inner);
            builds.get(&build_id).map(|b| b.finished.clone())
        };
        match receiver {
            Some(mut rx) => {
                let report = rx
                    .wait_for(Option::is_some)
                    .await
                    .map_err(|_| BuildError::Agent("build task ended without a report".to_string()))?;
                report
                    .clone()
                    .ok_or(BuildError::SessionNotFound(build_id))
            }
            None => self
                .store
                .get(build_id)
                .await?
                .ok_or(BuildError::SessionNotFound(build_id)),
        }
    }

    /// Start a build and wait for its report.
    pub async fn run_to_completion(&self, request: BuildRequest) -> BuildResult<TerminalReport> {
        let build_id = self.start(request)?;
        self.wait(build_id).await
    }
}
