//! Verification swarm.
//!
//! A fixed battery of independent post-merge checks. Every registered check
//! runs, concurrently, against the same read-only snapshot, and every check
//! produces exactly one [`CheckResult`]. Errors and panics inside a check are
//! recorded as that check crashing; they never abort the swarm. Panic
//! isolation needs the unwinding panic strategy, so no build profile may set
//! `panic = "abort"`.
//!
//! | Check | Kind | Blocking |
//! |-------|------|----------|
//! | `build` | configured command | yes |
//! | `lint` | configured command | no (default) |
//! | `placeholder-scan` | static markers, empty files | yes |
//! | `forbidden-paths` | secrets in the workspace | yes |
//! | `smoke-test` | HTTP GET, 2xx | yes, only when a URL is configured |

pub mod command;
pub mod forbidden_paths;
pub mod placeholder;
pub mod smoke_test;
pub mod traits;

pub use command::CommandCheck;
pub use forbidden_paths::ForbiddenPaths;
pub use placeholder::PlaceholderScan;
pub use smoke_test::SmokeTest;
pub use traits::{CheckInput, VerificationCheck};

use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use crate::domain::models::{CheckResult, VerificationConfig, VerificationReport, WorkspaceSnapshot};
use crate::domain::ports::Sandbox;

/// Runs every registered check and aggregates the results.
#[derive(Default)]
pub struct VerificationSwarm {
    checks: Vec<Box<dyn VerificationCheck>>,
}

impl VerificationSwarm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the standard battery from configuration.
    pub fn from_config(config: &VerificationConfig) -> anyhow::Result<Self> {
        let mut swarm = Self::new();
        for command in &config.commands {
            swarm.add(Box::new(CommandCheck::from(command)));
        }
        swarm.add(Box::new(PlaceholderScan::new(config.placeholder_markers.clone())));
        swarm.add(Box::new(ForbiddenPaths::new(config.forbidden_paths.clone())));
        if let Some(url) = &config.smoke_test_url {
            swarm.add(Box::new(SmokeTest::new(url)?));
        }
        Ok(swarm)
    }

    pub fn add(&mut self, check: Box<dyn VerificationCheck>) {
        self.checks.push(check);
    }

    pub fn with_check(mut self, check: Box<dyn VerificationCheck>) -> Self {
        self.add(check);
        self
    }

    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    async fn run_one(check: &dyn VerificationCheck, input: &CheckInput<'_>) -> CheckResult {
        let started = Instant::now();
        let outcome = AssertUnwindSafe(check.run(input)).catch_unwind().await;
        let mut result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!(check = check.name(), error = %e, "verification check crashed");
                CheckResult::crashed(check.name(), e)
            }
            Err(panic) => {
                let cause = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic".to_string());
                tracing::error!(check = check.name(), cause = %cause, "verification check panicked");
                CheckResult::crashed(check.name(), cause)
            }
        };
        // The registration decides naming and blocking, not the check body.
        result.name = check.name().to_string();
        result.blocking = check.blocking();
        result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(
            check = %result.name,
            passed = result.passed,
            blocking = result.blocking,
            duration_ms = result.duration_ms,
            "verification check finished"
        );
        result
    }

    /// Run every check against `snapshot` and aggregate.
    ///
    /// The report holds one entry per registered check, in registration
    /// order.
    pub async fn verify(&self, snapshot: &WorkspaceSnapshot, sandbox: &dyn Sandbox) -> VerificationReport {
        let input = CheckInput { snapshot, sandbox };
        let results = join_all(self.checks.iter().map(|c| Self::run_one(c.as_ref(), &input))).await;
        let report = VerificationReport::from_checks(results);
        tracing::info!(
            checks = report.checks.len(),
            passed = report.overall_passed,
            failed_blocking = ?report.failed_blocking(),
            "verification completed"
        );
        report
    }
}
