//! Plan-file driven agent runner.
//!
//! A plan file (YAML or JSON) carries the implementation plan plus, per
//! partition id, the steps its agent performs. It stands in for a model
//! backend when replaying recorded builds or running the CLI offline.
//!
//! ```yaml
//! plan:
//!   features:
//!     - id: api
//!       name: Health route
//!       description: GET /health returning ok
//! scripts:
//!   api:
//!     - action: write
//!       path: routes/health.ts
//!       content: "export const health = () => 'ok';\n"
//! costs:
//!   api: 0.12
//! ```

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::models::{
    AgentFailure, BuildRequest, Discovery, DiscoveryKind, ImplementationPlan, IntentContract,
};
use crate::domain::ports::{AgentContext, AgentOutcome, AgentRunner, WorkPlanner};

/// One action an agent performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentStep {
    Write { path: String, content: String },
    Delete { path: String },
    Publish { kind: DiscoveryKind, summary: String },
    /// Stand-in for a model call.
    Sleep { ms: u64 },
    Fail {
        reason: String,
        #[serde(default)]
        retryable: bool,
    },
}

impl AgentStep {
    pub fn write(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Write {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::Delete { path: path.into() }
    }

    pub fn publish(kind: DiscoveryKind, summary: impl Into<String>) -> Self {
        Self::Publish {
            kind,
            summary: summary.into(),
        }
    }

    pub fn sleep(duration: Duration) -> Self {
        Self::Sleep {
            ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
            retryable: false,
        }
    }
}

fn sandbox_failure(err: BuildError) -> AgentFailure {
    match err {
        BuildError::CancellationRequested => AgentFailure::permanent("cancelled"),
        other => AgentFailure::permanent(other.to_string()),
    }
}

/// Execute steps in order, stopping at the first failure or once
/// cancellation is observed between steps.
pub async fn execute_steps(ctx: &dyn AgentContext, steps: &[AgentStep]) -> Result<usize, AgentFailure> {
    let mut done = 0;
    for step in steps {
        if ctx.is_cancelled() {
            return Err(AgentFailure::permanent("cancelled"));
        }
        match step {
            AgentStep::Write { path, content } => {
                let claimed_by = ctx
                    .query(None, true)
                    .into_iter()
                    .find(|e| e.kind == DiscoveryKind::FileCreated && e.path() == Some(path.as_str()))
                    .map(|e| e.source_agent_id);
                if let Some(other) = claimed_by {
                    ctx.publish(
                        Discovery::new(
                            DiscoveryKind::ConflictDetected,
                            format!("{path} already created by {other}"),
                        )
                        .with_detail("path", serde_json::Value::String(path.clone())),
                    );
                }
                ctx.write_file(path, content).await.map_err(sandbox_failure)?;
            }
            AgentStep::Delete { path } => ctx.delete_file(path).await.map_err(sandbox_failure)?,
            AgentStep::Publish { kind, summary } => ctx.publish(Discovery::new(*kind, summary.clone())),
            AgentStep::Sleep { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
            AgentStep::Fail { reason, retryable } => {
                return Err(AgentFailure {
                    reason: reason.clone(),
                    retryable: *retryable,
                })
            }
        }
        done += 1;
    }
    Ok(done)
}

/// Contents of a plan file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentScript {
    #[serde(default)]
    pub plan: ImplementationPlan,
    /// Steps keyed by partition id.
    #[serde(default)]
    pub scripts: BTreeMap<String, Vec<AgentStep>>,
    /// Reported spend per partition id.
    #[serde(default)]
    pub costs: BTreeMap<String, f64>,
}

/// Runs the scripted steps for each partition and serves the file's plan.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgentRunner {
    script: AgentScript,
}

impl ScriptedAgentRunner {
    pub fn new(script: AgentScript) -> Self {
        Self { script }
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let script: AgentScript = serde_yaml::from_str(text).context("Failed to parse plan file")?;
        Ok(Self::new(script))
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file {}", path.display()))?;
        Self::from_yaml(&text)
    }

    pub fn script(&self) -> &AgentScript {
        &self.script
    }
}

#[async_trait]
impl AgentRunner for ScriptedAgentRunner {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn run(&self, ctx: &dyn AgentContext) -> Result<AgentOutcome, AgentFailure> {
        let id = ctx.partition().id.as_str();
        let steps = self.script.scripts.get(id).map(Vec::as_slice).unwrap_or_default();
        let done = execute_steps(ctx, steps).await?;
        let cost = self.script.costs.get(id).copied().unwrap_or(0.0);
        Ok(AgentOutcome::new(format!("{done} step(s) applied")).with_cost(cost))
    }
}

#[async_trait]
impl WorkPlanner for ScriptedAgentRunner {
    fn name(&self) -> &'static str {
        "plan-file"
    }

    async fn plan(&self, _request: &BuildRequest, _contract: &IntentContract) -> BuildResult<ImplementationPlan> {
        Ok(self.script.plan.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plan_file() {
        let yaml = r#"
plan:
  phases:
    - name: Backend
      features: [health route]
    - id: qa
      name: Tests
scripts:
  phase-0:
    - action: write
      path: routes/health.ts
      content: "export const health = 1;\n"
    - action: publish
      kind: decision
      summary: GET /health returns 200
  qa:
    - action: sleep
      ms: 10
    - action: fail
      reason: rate limited
      retryable: true
costs:
  phase-0: 0.25
"#;
        let runner = ScriptedAgentRunner::from_yaml(yaml).unwrap();
        let script = runner.script();
        assert_eq!(script.plan.phases.len(), 2);
        assert_eq!(script.scripts["phase-0"].len(), 2);
        assert_eq!(
            script.scripts["qa"][1],
            AgentStep::Fail {
                reason: "rate limited".into(),
                retryable: true
            }
        );
        assert_eq!(script.costs["phase-0"], 0.25);
    }

    #[test]
    fn json_is_accepted() {
        let json = r#"{"scripts": {"a": [{"action": "delete", "path": "old.ts"}]}}"#;
        let runner = ScriptedAgentRunner::from_yaml(json).unwrap();
        assert_eq!(runner.script().scripts["a"], vec![AgentStep::delete("old.ts")]);
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(ScriptedAgentRunner::from_yaml("scripts:\n  a:\n    - action: teleport\n").is_err());
    }
}
