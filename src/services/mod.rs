//! Pipeline services.
//!
//! Each component of the build loop lives in its own module; the
//! [`BuildOrchestrator`] wires them together behind Start/Cancel Build.

pub mod agent_dispatcher;
pub mod build_state_machine;
pub mod context_bus;
pub mod intent_contract;
pub mod merge_resolver;
pub mod orchestrator;
pub mod progress_bus;
pub mod verification;
pub mod work_planner;

pub use agent_dispatcher::{AgentDispatcher, DispatchContext, DispatcherConfig, TaskBoard};
pub use build_state_machine::{BuildStateMachine, PipelineComponents, SessionHandle};
pub use context_bus::{AgentRegistration, ContextBus};
pub use intent_contract::IntentContractManager;
pub use merge_resolver::{MergePlan, MergeResolver};
pub use orchestrator::BuildOrchestrator;
pub use progress_bus::{
    BuildSubscription, EventSeverity, ProgressBus, ProgressBusConfig, ProgressEvent, ProgressPayload,
    SequenceNumber,
};
pub use verification::{CheckInput, VerificationCheck, VerificationSwarm};
pub use work_planner::{partitions_for, CriteriaPlanner};
