//! Shared helpers for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use kriptik::adapters::sandbox::InMemorySandboxProvider;
use kriptik::adapters::store::InMemoryReportStore;
use kriptik::domain::errors::BuildResult;
use kriptik::domain::models::{BuildRequest, Config, ImplementationPlan, IntentContract, PlanPhase};
use kriptik::domain::ports::{AgentRunner, WorkPlanner};
use kriptik::services::BuildOrchestrator;

/// Planner that always returns the same plan.
pub struct FixedPlanner(pub ImplementationPlan);

#[async_trait]
impl WorkPlanner for FixedPlanner {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn plan(&self, _request: &BuildRequest, _contract: &IntentContract) -> BuildResult<ImplementationPlan> {
        Ok(self.0.clone())
    }
}

/// A plan with one phase per `(id, name)` pair, in priority order.
pub fn plan_of(phases: &[(&str, &str)]) -> ImplementationPlan {
    ImplementationPlan {
        phases: phases
            .iter()
            .map(|(id, name)| PlanPhase {
                id: Some((*id).to_string()),
                name: Some((*name).to_string()),
                features: Vec::new(),
                dependencies: Vec::new(),
            })
            .collect(),
        features: Vec::new(),
    }
}

/// Everything an end-to-end test needs to drive and inspect one build.
pub struct Harness {
    pub orchestrator: BuildOrchestrator,
    pub sandboxes: Arc<InMemorySandboxProvider>,
    pub store: Arc<InMemoryReportStore>,
}

pub fn harness(config: &Config, runner: Arc<dyn AgentRunner>, planner: Arc<dyn WorkPlanner>) -> Harness {
    let sandboxes = Arc::new(InMemorySandboxProvider::new().with_file("package.json", "{\"name\":\"app\"}\n"));
    let store = Arc::new(InMemoryReportStore::new());
    let orchestrator = BuildOrchestrator::from_config(
        config,
        runner,
        planner,
        Arc::clone(&sandboxes) as _,
        Arc::clone(&store) as _,
    )
    .expect("pipeline wiring");
    Harness {
        orchestrator,
        sandboxes,
        store,
    }
}

/// Config with short phase deadlines for timeout scenarios.
pub fn fast_timeout_config(parallel_build_secs: u64) -> Config {
    let mut config = Config::default();
    config.orchestrator.phase_timeouts.parallel_build = parallel_build_secs;
    config.orchestrator.cancel_grace_ms = 100;
    config
}

pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("kriptik=debug")
        .try_init();
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_for<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
