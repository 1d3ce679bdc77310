//! KripTik - multi-agent build loop orchestrator
//!
//! Turns a natural-language prompt into a working code change: the intent is
//! locked into checkable success criteria, work is split across concurrently
//! running agents that share discoveries, their outputs are merged, verified
//! and checked against the locked intent before the build is declared done.
//!
//! # Architecture
//!
//! Hexagonal layout:
//!
//! - **Domain Layer** (`domain`): models, errors and the ports the core depends on
//! - **Service Layer** (`services`): the pipeline components and the build state machine
//! - **Adapters** (`adapters`): sandboxes, agent runners and report stores
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use kriptik::adapters::agents::ScriptedAgentRunner;
//! use kriptik::adapters::sandbox::InMemorySandboxProvider;
//! use kriptik::adapters::store::InMemoryReportStore;
//! use kriptik::{BuildOrchestrator, BuildRequest, Config, CriteriaPlanner};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let orchestrator = BuildOrchestrator::from_config(
//!     &Config::default(),
//!     Arc::new(ScriptedAgentRunner::default()),
//!     Arc::new(CriteriaPlanner),
//!     Arc::new(InMemorySandboxProvider::new()),
//!     Arc::new(InMemoryReportStore::new()),
//! )?;
//! let report = orchestrator
//!     .run_to_completion(BuildRequest::new("add a health-check endpoint", "demo", "me"))
//!     .await?;
//! println!("{}", report.phase);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{BuildError, BuildResult, ErrorKind};
pub use domain::models::{
    AgentTask, AgentTaskStatus, BuildPhase, BuildRequest, BuildSession, Config, IntentContract,
    MergeReport, SuccessCriterion, TerminalReport, VerificationReport, WorkPartition,
    WorkspaceSnapshot,
};
pub use domain::ports::{AgentRunner, ReportStore, Sandbox, SandboxProvider, WorkPlanner};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{BuildOrchestrator, CriteriaPlanner, ProgressEvent, ProgressPayload};
