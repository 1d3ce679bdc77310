//! Forbidden paths check: secrets such as `.env` must not be part of the
//! generated workspace.

use async_trait::async_trait;

use super::traits::{CheckInput, VerificationCheck};
use crate::domain::models::CheckResult;

pub struct ForbiddenPaths {
    names: Vec<String>,
}

impl ForbiddenPaths {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Matches on the file name so `apps/web/.env` is caught as well.
    fn is_forbidden(&self, path: &str) -> bool {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        self.names.iter().any(|n| n == file_name || n == path)
    }
}

#[async_trait]
impl VerificationCheck for ForbiddenPaths {
    fn name(&self) -> &str {
        "forbidden-paths"
    }

    fn blocking(&self) -> bool {
        true
    }

    async fn run(&self, input: &CheckInput<'_>) -> anyhow::Result<CheckResult> {
        let hits: Vec<&str> = input
            .snapshot
            .paths()
            .filter(|p| self.is_forbidden(p))
            .collect();
        if hits.is_empty() {
            Ok(CheckResult::pass(self.name(), "no forbidden files"))
        } else {
            Ok(CheckResult::fail(
                self.name(),
                format!("forbidden file(s) present: {}", hits.join(", ")),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sandbox::InMemorySandbox;
    use crate::domain::models::WorkspaceSnapshot;

    #[tokio::test]
    async fn nested_env_file_is_caught() {
        let mut snapshot = WorkspaceSnapshot::default();
        snapshot.insert("apps/web/.env", "STRIPE_KEY=x");
        snapshot.insert("apps/web/.env.example", "STRIPE_KEY=");
        let sandbox = InMemorySandbox::new("s");
        let check = ForbiddenPaths::new(vec![".env".into()]);

        let result = check
            .run(&CheckInput {
                snapshot: &snapshot,
                sandbox: &sandbox,
            })
            .await
            .unwrap();
        assert!(!result.passed);
        assert_eq!(result.detail, "forbidden file(s) present: apps/web/.env");
    }
}
