//! Build phase state model.
//!
//! Phases advance strictly forward in declaration order. FAILED and
//! CANCELLED are reachable from any non-terminal phase; terminal phases never
//! transition again.

use serde::{Deserialize, Serialize};

/// Phase of a build session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildPhase {
    IntentLock,
    Initialization,
    ParallelBuild,
    IntegrationCheck,
    FunctionalTest,
    IntentSatisfaction,
    Demo,
    Done,
    Failed,
    Cancelled,
}

impl Default for BuildPhase {
    fn default() -> Self {
        Self::IntentLock
    }
}

impl BuildPhase {
    /// The working phases in execution order.
    pub const PIPELINE: [BuildPhase; 7] = [
        Self::IntentLock,
        Self::Initialization,
        Self::ParallelBuild,
        Self::IntegrationCheck,
        Self::FunctionalTest,
        Self::IntentSatisfaction,
        Self::Demo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntentLock => "INTENT_LOCK",
            Self::Initialization => "INITIALIZATION",
            Self::ParallelBuild => "PARALLEL_BUILD",
            Self::IntegrationCheck => "INTEGRATION_CHECK",
            Self::FunctionalTest => "FUNCTIONAL_TEST",
            Self::IntentSatisfaction => "INTENT_SATISFACTION",
            Self::Demo => "DEMO",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "INTENT_LOCK" => Some(Self::IntentLock),
            "INITIALIZATION" => Some(Self::Initialization),
            "PARALLEL_BUILD" => Some(Self::ParallelBuild),
            "INTEGRATION_CHECK" => Some(Self::IntegrationCheck),
            "FUNCTIONAL_TEST" => Some(Self::FunctionalTest),
            "INTENT_SATISFACTION" => Some(Self::IntentSatisfaction),
            "DEMO" => Some(Self::Demo),
            "DONE" => Some(Self::Done),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" | "CANCELED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// The phase that follows this one on the success path.
    pub fn next(&self) -> Option<BuildPhase> {
        match self {
            Self::IntentLock => Some(Self::Initialization),
            Self::Initialization => Some(Self::ParallelBuild),
            Self::ParallelBuild => Some(Self::IntegrationCheck),
            Self::IntegrationCheck => Some(Self::FunctionalTest),
            Self::FunctionalTest => Some(Self::IntentSatisfaction),
            Self::IntentSatisfaction => Some(Self::Demo),
            Self::Demo => Some(Self::Done),
            Self::Done | Self::Failed | Self::Cancelled => None,
        }
    }

    pub fn can_transition_to(&self, target: BuildPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match target {
            Self::Failed | Self::Cancelled => true,
            other => self.next() == Some(other),
        }
    }
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_only() {
        assert!(BuildPhase::IntentLock.can_transition_to(BuildPhase::Initialization));
        assert!(!BuildPhase::IntentLock.can_transition_to(BuildPhase::ParallelBuild));
        assert!(!BuildPhase::ParallelBuild.can_transition_to(BuildPhase::Initialization));
        assert!(BuildPhase::Demo.can_transition_to(BuildPhase::Done));
    }

    #[test]
    fn failure_reachable_from_any_non_terminal() {
        for phase in BuildPhase::PIPELINE {
            assert!(phase.can_transition_to(BuildPhase::Failed));
            assert!(phase.can_transition_to(BuildPhase::Cancelled));
        }
    }

    #[test]
    fn terminal_phases_are_sinks() {
        for phase in [BuildPhase::Done, BuildPhase::Failed, BuildPhase::Cancelled] {
            assert!(phase.is_terminal());
            assert!(!phase.can_transition_to(BuildPhase::Failed));
            assert!(!phase.can_transition_to(BuildPhase::Cancelled));
            assert!(phase.next().is_none());
        }
    }

    #[test]
    fn ordering_follows_pipeline() {
        let mut sorted = BuildPhase::PIPELINE;
        sorted.sort();
        assert_eq!(sorted, BuildPhase::PIPELINE);
        assert!(BuildPhase::Demo < BuildPhase::Done);
    }

    #[test]
    fn string_round_trip() {
        assert_eq!(BuildPhase::from_str("parallel-build"), Some(BuildPhase::ParallelBuild));
        assert_eq!(BuildPhase::from_str("canceled"), Some(BuildPhase::Cancelled));
        assert_eq!(BuildPhase::from_str("nope"), None);
    }
}
