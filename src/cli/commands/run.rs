//! Run CLI command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::open_report_store;
use super::report::ReportDetailOutput;
use crate::adapters::agents::ScriptedAgentRunner;
use crate::adapters::sandbox::LocalSandboxProvider;
use crate::cli::output::{output, ProgressRenderer};
use crate::domain::models::{BuildPhase, BuildRequest};
use crate::domain::ports::WorkPlanner;
use crate::infrastructure::config::ConfigLoader;
use crate::services::{BuildOrchestrator, CriteriaPlanner};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// What to build, in plain language
    pub prompt: String,

    /// Project the build belongs to
    #[arg(short, long, default_value = "default")]
    pub project: String,

    /// User requesting the build
    #[arg(short, long, env = "USER", default_value = "local")]
    pub user: String,

    /// Plan file with the implementation plan and per-partition agent steps
    #[arg(long)]
    pub plan: Option<PathBuf>,

    /// Directory under which build sandboxes are created
    #[arg(short, long, default_value = ".kriptik/sandboxes")]
    pub workdir: PathBuf,

    /// Project directory copied into each sandbox
    #[arg(short, long)]
    pub template: Option<PathBuf>,

    /// Keep the sandbox directory after the build ends
    #[arg(long)]
    pub keep: bool,

    /// Override orchestrator.max_concurrent_agents
    #[arg(long)]
    pub max_agents: Option<usize>,
}

pub async fn execute(args: RunArgs, json_mode: bool) -> Result<()> {
    let mut config = ConfigLoader::load().context("Failed to load configuration")?;
    if let Some(max_agents) = args.max_agents {
        config.orchestrator.max_concurrent_agents = max_agents;
        ConfigLoader::validate(&config)?;
    }

    let runner = Arc::new(match &args.plan {
        Some(path) => ScriptedAgentRunner::from_file(path)?,
        None => ScriptedAgentRunner::default(),
    });
    let planner: Arc<dyn WorkPlanner> = if args.plan.is_some() {
        runner.clone()
    } else {
        Arc::new(CriteriaPlanner)
    };

    let mut sandboxes = LocalSandboxProvider::new(&args.workdir).keep_workspaces(args.keep);
    if let Some(template) = &args.template {
        sandboxes = sandboxes.with_template(template);
    }

    let store = open_report_store(&config).await?;
    let orchestrator = Arc::new(BuildOrchestrator::from_config(
        &config,
        runner,
        planner,
        Arc::new(sandboxes),
        store,
    )?);

    let request = BuildRequest::new(args.prompt, args.project, args.user);
    let build_id = orchestrator.start(request)?;
    info!(build_id = %build_id, "build started from cli");

    let cancel_on_interrupt = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                orchestrator.cancel(build_id);
            }
        })
    };

    let renderer = if json_mode {
        ProgressRenderer::hidden()
    } else {
        ProgressRenderer::new()
    };
    let mut events = orchestrator.subscribe(build_id);
    while let Some(event) = events.next().await {
        renderer.handle(&event);
    }

    let report = orchestrator.wait(build_id).await?;
    cancel_on_interrupt.abort();

    let phase = report.phase;
    output(&ReportDetailOutput(report), json_mode);
    if phase != BuildPhase::Done {
        anyhow::bail!("build {build_id} ended in {phase}");
    }
    Ok(())
}
