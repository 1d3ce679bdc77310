//! Agent runner adapters.

pub mod mock;
pub mod scripted;

pub use mock::MockAgentRunner;
pub use scripted::{execute_steps, AgentScript, AgentStep, ScriptedAgentRunner};
