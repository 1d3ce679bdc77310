//! Command check.
//!
//! Runs a configured program (e.g. `npm run build`, `npm run lint`) inside the
//! sandbox and passes when it exits zero. Package-manager `run <script>`
//! commands are skipped when `package.json` does not declare the script.

use async_trait::async_trait;

use super::traits::{CheckInput, VerificationCheck};
use crate::domain::models::{CheckResult, CommandCheckConfig, WorkspaceSnapshot};

const PACKAGE_MANAGERS: [&str; 3] = ["npm", "pnpm", "yarn"];

pub struct CommandCheck {
    name: String,
    program: String,
    args: Vec<String>,
    blocking: bool,
}

impl CommandCheck {
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            blocking: true,
        }
    }

    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Script name for `<package manager> run <script>` commands.
    fn script(&self) -> Option<&str> {
        if !PACKAGE_MANAGERS.contains(&self.program.as_str()) {
            return None;
        }
        match self.args.as_slice() {
            [run, script, ..] if run == "run" => Some(script.as_str()),
            _ => None,
        }
    }

    fn declares_script(snapshot: &WorkspaceSnapshot, script: &str) -> bool {
        snapshot
            .get("package.json")
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
            .is_some_and(|manifest| manifest["scripts"].get(script).is_some())
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl From<&CommandCheckConfig> for CommandCheck {
    fn from(config: &CommandCheckConfig) -> Self {
        Self::new(&config.name, &config.program, config.args.clone()).with_blocking(config.blocking)
    }
}

#[async_trait]
impl VerificationCheck for CommandCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn blocking(&self) -> bool {
        self.blocking
    }

    async fn run(&self, input: &CheckInput<'_>) -> anyhow::Result<CheckResult> {
        if let Some(script) = self.script() {
            if !Self::declares_script(input.snapshot, script) {
                tracing::debug!(check = %self.name, script, "package.json has no such script; skipping");
                return Ok(CheckResult::pass(
                    &self.name,
                    format!("skipped: package.json declares no `{script}` script"),
                )
                .with_blocking(self.blocking));
            }
        }

        tracing::info!(check = %self.name, command = %self.command_line(), "running command check");

        let output = input
            .sandbox
            .run_command(&self.program, &self.args)
            .await
            .map_err(|e| anyhow::anyhow!("failed to run `{}`: {e}", self.command_line()))?;

        let result = if output.success() {
            CheckResult::pass(&self.name, format!("`{}` succeeded", self.command_line()))
        } else {
            CheckResult::fail(
                &self.name,
                format!(
                    "`{}` exited with {}: {}",
                    self.command_line(),
                    output.exit_code,
                    output.tail()
                ),
            )
        };
        Ok(result.with_blocking(self.blocking))
    }
}
