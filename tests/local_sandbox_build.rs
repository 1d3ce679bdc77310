//! A full build against directory-backed sandboxes.

use std::fs;
use std::sync::Arc;

use kriptik::adapters::agents::ScriptedAgentRunner;
use kriptik::adapters::sandbox::LocalSandboxProvider;
use kriptik::adapters::store::InMemoryReportStore;
use kriptik::domain::models::{BuildPhase, BuildRequest, Config};
use kriptik::domain::ports::WorkPlanner;
use kriptik::BuildOrchestrator;
use tempfile::TempDir;

const PLAN: &str = r#"
plan:
  features:
    - id: route
      name: Health route
      files: [routes/health.ts]
scripts:
  route:
    - action: write
      path: routes/health.ts
      content: "export const health = () => 'ok';\n"
    - action: delete
      path: legacy/ping.ts
"#;

fn template() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("package.json"), "{\"name\":\"app\"}\n").unwrap();
    fs::create_dir_all(dir.path().join("legacy")).unwrap();
    fs::write(dir.path().join("legacy/ping.ts"), "export const ping = 1;\n").unwrap();
    dir
}

fn orchestrator(provider: LocalSandboxProvider) -> BuildOrchestrator {
    let runner = Arc::new(ScriptedAgentRunner::from_yaml(PLAN).unwrap());
    let planner: Arc<dyn WorkPlanner> = runner.clone();
    BuildOrchestrator::from_config(
        &Config::default(),
        runner,
        planner,
        Arc::new(provider),
        Arc::new(InMemoryReportStore::new()),
    )
    .unwrap()
}

#[tokio::test]
async fn build_writes_into_a_copy_of_the_template() {
    let template = template();
    let root = TempDir::new().unwrap();
    let provider = LocalSandboxProvider::new(root.path())
        .with_template(template.path())
        .keep_workspaces(true);

    let report = orchestrator(provider)
        .run_to_completion(BuildRequest::new("add a health-check endpoint", "Acme Web", "dev"))
        .await
        .unwrap();
    assert_eq!(report.phase, BuildPhase::Done, "failure: {:?}", report.failure_reason);
    assert_eq!(
        report.merge_report.as_ref().unwrap().deleted_paths,
        vec!["legacy/ping.ts".to_string()]
    );

    let workspaces: Vec<_> = fs::read_dir(root.path()).unwrap().map(|e| e.unwrap().path()).collect();
    assert_eq!(workspaces.len(), 1);
    let workspace = &workspaces[0];
    assert_eq!(
        fs::read_to_string(workspace.join("routes/health.ts")).unwrap(),
        "export const health = () => 'ok';\n"
    );
    assert!(workspace.join("package.json").exists());
    assert!(!workspace.join("legacy/ping.ts").exists());

    // The template itself is never touched.
    assert!(template.path().join("legacy/ping.ts").exists());
    assert!(!template.path().join("routes").exists());
}

#[tokio::test]
async fn workspace_is_removed_after_the_build_by_default() {
    let template = template();
    let root = TempDir::new().unwrap();
    let provider = LocalSandboxProvider::new(root.path()).with_template(template.path());

    let report = orchestrator(provider)
        .run_to_completion(BuildRequest::new("add a health-check endpoint", "acme", "dev"))
        .await
        .unwrap();
    assert_eq!(report.phase, BuildPhase::Done, "failure: {:?}", report.failure_reason);
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}
