//! Port trait definitions (Hexagonal Architecture)
//!
//! Interfaces the orchestrator core depends on:
//! - Sandbox / SandboxProvider: isolated workspaces and command execution
//! - AgentRunner / AgentContext: the coding-agent backend
//! - WorkPlanner: splits a locked intent into work partitions
//! - ReportStore: terminal report persistence

pub mod agent_runner;
pub mod planner;
pub mod report_store;
pub mod sandbox;

pub use agent_runner::{AgentContext, AgentOutcome, AgentRunner};
pub use planner::WorkPlanner;
pub use report_store::ReportStore;
pub use sandbox::{CommandOutput, Sandbox, SandboxProvider};
