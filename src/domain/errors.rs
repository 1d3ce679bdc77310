//! Domain errors for the build orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::models::BuildPhase;

/// Machine-readable discriminant of a [`BuildError`].
///
/// Carried in terminal reports next to the human-readable failure reason so
/// consumers can branch on the failure without parsing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyIntent,
    InvalidPrompt,
    ContractLocked,
    PhaseTimeout,
    AllAgentsFailed,
    UnresolvedMergeConflict,
    VerificationCheckCrashed,
    VerificationFailed,
    IntentNotSatisfied,
    CancellationRequested,
    BudgetExceeded,
    InvalidStateTransition,
    SessionNotFound,
    Sandbox,
    Agent,
    Store,
    Serialization,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyIntent => "empty_intent",
            Self::InvalidPrompt => "invalid_prompt",
            Self::ContractLocked => "contract_locked",
            Self::PhaseTimeout => "phase_timeout",
            Self::AllAgentsFailed => "all_agents_failed",
            Self::UnresolvedMergeConflict => "unresolved_merge_conflict",
            Self::VerificationCheckCrashed => "verification_check_crashed",
            Self::VerificationFailed => "verification_failed",
            Self::IntentNotSatisfied => "intent_not_satisfied",
            Self::CancellationRequested => "cancellation_requested",
            Self::BudgetExceeded => "budget_exceeded",
            Self::InvalidStateTransition => "invalid_state_transition",
            Self::SessionNotFound => "session_not_found",
            Self::Sandbox => "sandbox",
            Self::Agent => "agent",
            Self::Store => "store",
            Self::Serialization => "serialization",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the build pipeline.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    #[error("Prompt yields no actionable success criteria")]
    EmptyIntent,

    #[error("Invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("Intent contract is locked; criteria cannot be modified")]
    ContractLocked,

    #[error("Phase {0} exceeded its deadline")]
    PhaseTimeout(BuildPhase),

    #[error("All {failed} agent task(s) failed")]
    AllAgentsFailed { failed: usize },

    #[error("Unresolved merge conflict(s) in: {}", .paths.join(", "))]
    UnresolvedMergeConflict { paths: Vec<String> },

    #[error("Verification check '{0}' crashed")]
    VerificationCheckCrashed(String),

    #[error("Blocking verification check(s) failed: {}", .failed_checks.join(", "))]
    VerificationFailed { failed_checks: Vec<String> },

    #[error("Intent not satisfied; unmet criteria: {}", .unmet.join(", "))]
    IntentNotSatisfied { unmet: Vec<String> },

    #[error("Build was cancelled")]
    CancellationRequested,

    #[error("Budget exceeded: spent ${spent_usd:.2} of ${limit_usd:.2}")]
    BudgetExceeded { spent_usd: f64, limit_usd: f64 },

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidStateTransition { from: BuildPhase, to: BuildPhase },

    #[error("Build session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Report store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BuildError {
    /// The machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyIntent => ErrorKind::EmptyIntent,
            Self::InvalidPrompt(_) => ErrorKind::InvalidPrompt,
            Self::ContractLocked => ErrorKind::ContractLocked,
            Self::PhaseTimeout(_) => ErrorKind::PhaseTimeout,
            Self::AllAgentsFailed { .. } => ErrorKind::AllAgentsFailed,
            Self::UnresolvedMergeConflict { .. } => ErrorKind::UnresolvedMergeConflict,
            Self::VerificationCheckCrashed(_) => ErrorKind::VerificationCheckCrashed,
            Self::VerificationFailed { .. } => ErrorKind::VerificationFailed,
            Self::IntentNotSatisfied { .. } => ErrorKind::IntentNotSatisfied,
            Self::CancellationRequested => ErrorKind::CancellationRequested,
            Self::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
            Self::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
            Self::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Self::Sandbox(_) => ErrorKind::Sandbox,
            Self::Agent(_) => ErrorKind::Agent,
            Self::Store(_) => ErrorKind::Store,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Whether this error ends the session as CANCELLED rather than FAILED.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::CancellationRequested)
    }
}

pub type BuildResult<T> = Result<T, BuildError>;

impl From<sqlx::Error> for BuildError {
    fn from(err: sqlx::Error) -> Self {
        BuildError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for BuildError {
    fn from(err: serde_json::Error) -> Self {
        BuildError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for BuildError {
    fn from(err: std::io::Error) -> Self {
        BuildError::Sandbox(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(BuildError::EmptyIntent.kind(), ErrorKind::EmptyIntent);
        assert_eq!(
            BuildError::PhaseTimeout(BuildPhase::ParallelBuild).kind(),
            ErrorKind::PhaseTimeout
        );
        assert!(BuildError::CancellationRequested.is_cancellation());
        assert!(!BuildError::AllAgentsFailed { failed: 2 }.is_cancellation());
    }

    #[test]
    fn messages_are_human_readable() {
        let err = BuildError::PhaseTimeout(BuildPhase::ParallelBuild);
        assert_eq!(err.to_string(), "Phase PARALLEL_BUILD exceeded its deadline");

        let err = BuildError::UnresolvedMergeConflict {
            paths: vec!["routes/users.ts".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Unresolved merge conflict(s) in: routes/users.ts"
        );
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UnresolvedMergeConflict).unwrap();
        assert_eq!(json, "\"unresolved_merge_conflict\"");
    }
}
