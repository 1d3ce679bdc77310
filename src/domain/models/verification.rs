//! Verification outcome records.

use serde::{Deserialize, Serialize};

/// Result of one verification check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
    /// Blocking checks gate the session; advisory ones are informational.
    pub blocking: bool,
    #[serde(default)]
    pub duration_ms: u64,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            detail: detail.into(),
            blocking: true,
            duration_ms: 0,
        }
    }

    pub fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            detail: detail.into(),
            blocking: true,
            duration_ms: 0,
        }
    }

    /// Record for a check that errored internally.
    pub fn crashed(name: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        let name = name.into();
        let detail = format!("{name} crashed: {cause}");
        Self::fail(name, detail)
    }

    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }
}

/// Outcome of the verification swarm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// One entry per registered check, in registration order.
    pub checks: Vec<CheckResult>,
    pub overall_passed: bool,
}

impl VerificationReport {
    /// Aggregate: passes when every blocking check passed.
    pub fn from_checks(checks: Vec<CheckResult>) -> Self {
        let overall_passed = checks.iter().filter(|c| c.blocking).all(|c| c.passed);
        Self { checks, overall_passed }
    }

    pub fn failed_blocking(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| c.blocking && !c.passed)
            .map(|c| c.name.clone())
            .collect()
    }
}
