pub mod agent_task;
pub mod config;
pub mod context;
pub mod intent;
pub mod merge;
pub mod phase;
pub mod report;
pub mod session;
pub mod verification;
pub mod workspace;

pub use agent_task::{
    AgentFailure, AgentTask, AgentTaskStatus, FileChange, ImplementationPlan, PlanFeature,
    PlanPhase, WorkPartition,
};
pub use config::{
    CommandCheckConfig, Config, ConflictPolicy, DatabaseConfig, LoggingConfig, MergeConfig,
    OrchestratorConfig, PhaseTimeouts, RetryConfig, VerificationConfig,
};
pub use context::{ContextEntry, Discovery, DiscoveryKind};
pub use intent::{CriterionCheck, IntentContract, SuccessCriterion};
pub use merge::{ConflictClass, MergeConflict, MergeReport, ResolutionStrategy};
pub use phase::BuildPhase;
pub use report::{format_duration, TaskSummary, TerminalReport};
pub use session::{BuildRequest, BuildSession, PhaseTransition};
pub use verification::{CheckResult, VerificationReport};
pub use workspace::{normalize_path, WorkspaceSnapshot};
