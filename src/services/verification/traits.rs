//! Verification check trait and its input.

use async_trait::async_trait;

use crate::domain::models::{CheckResult, WorkspaceSnapshot};
use crate::domain::ports::Sandbox;

/// What every check sees: the merged snapshot (read-only) and the sandbox for
/// running commands.
pub struct CheckInput<'a> {
    pub snapshot: &'a WorkspaceSnapshot,
    pub sandbox: &'a dyn Sandbox,
}

/// One independent post-merge check.
///
/// Checks must not depend on each other's side effects. An `Err` is recorded
/// as a crash of this check only.
#[async_trait]
pub trait VerificationCheck: Send + Sync {
    /// Name shown in reports (e.g. `"placeholder-scan"`).
    fn name(&self) -> &str;

    /// Whether a failure of this check fails the session.
    fn blocking(&self) -> bool;

    async fn run(&self, input: &CheckInput<'_>) -> anyhow::Result<CheckResult>;
}
