//! Directory-backed sandbox.
//!
//! Each build gets its own directory under the provider's root, optionally
//! seeded by copying a template project. Commands run with `tokio::process`
//! inside that directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::models::normalize_path;
use crate::domain::ports::{CommandOutput, Sandbox, SandboxProvider};

/// Directories never listed or copied.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "target", ".kriptik"];

pub struct LocalSandbox {
    id: String,
    root: PathBuf,
}

impl LocalSandbox {
    pub fn new(id: impl Into<String>, root: PathBuf) -> Self {
        Self { id: id.into(), root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> BuildResult<PathBuf> {
        let relative =
            normalize_path(path).ok_or_else(|| BuildError::Sandbox(format!("path escapes workspace: {path}")))?;
        Ok(self.root.join(relative))
    }
}

async fn walk(root: &Path) -> std::io::Result<Vec<String>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let name = entry.file_name();
            if file_type.is_dir() {
                if !SKIPPED_DIRS.iter().any(|s| name == *s) {
                    pending.push(entry.path());
                }
            } else if file_type.is_file() {
                if let Ok(relative) = entry.path().strip_prefix(root) {
                    let parts: Vec<String> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    files.push(parts.join("/"));
                }
            }
        }
    }
    files.sort();
    Ok(files)
}

#[async_trait]
impl Sandbox for LocalSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn read_file(&self, path: &str) -> BuildResult<Option<String>> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            // Binary files are treated as absent.
            Ok(bytes) => Ok(String::from_utf8(bytes).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, path: &str, content: &str) -> BuildResult<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> BuildResult<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_files(&self) -> BuildResult<Vec<String>> {
        Ok(walk(&self.root).await?)
    }

    async fn run_command(&self, program: &str, args: &[String]) -> BuildResult<CommandOutput> {
        debug!(sandbox_id = %self.id, program, ?args, "running command");
        let output = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BuildError::Sandbox(format!("failed to run {program}: {e}")))?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Creates one directory per build under `root`.
pub struct LocalSandboxProvider {
    root: PathBuf,
    template: Option<PathBuf>,
    keep: bool,
}

impl LocalSandboxProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            template: None,
            keep: false,
        }
    }

    /// Copy this project directory into every new sandbox.
    pub fn with_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Leave sandbox directories in place on close.
    pub fn keep_workspaces(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }
}

#[async_trait]
impl SandboxProvider for LocalSandboxProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn open(&self, project_id: &str) -> BuildResult<Arc<dyn Sandbox>> {
        let slug: String = project_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let id = format!("{slug}-{}", Uuid::new_v4().simple());
        let root = self.root.join(&id);
        tokio::fs::create_dir_all(&root).await?;

        let sandbox = LocalSandbox::new(id, root);
        if let Some(template) = &self.template {
            let mut copied = 0usize;
            for path in walk(template).await? {
                if let Ok(content) = tokio::fs::read_to_string(template.join(&path)).await {
                    sandbox.write_file(&path, &content).await?;
                    copied += 1;
                }
            }
            debug!(sandbox_id = %sandbox.id, copied, "seeded sandbox from template");
        }
        Ok(Arc::new(sandbox))
    }

    async fn close(&self, sandbox: Arc<dyn Sandbox>) -> BuildResult<()> {
        if self.keep {
            return Ok(());
        }
        let dir = self.root.join(sandbox.id());
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            warn!(sandbox_id = %sandbox.id(), error = %e, "failed to remove sandbox directory");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn files_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalSandboxProvider::new(dir.path()).keep_workspaces(true);
        let sandbox = provider.open("demo app").await.unwrap();
        assert!(sandbox.id().starts_with("demo_app-"));

        sandbox.write_file("src/routes/users.ts", "export {};\n").await.unwrap();
        sandbox.write_file("README.md", "# demo\n").await.unwrap();
        assert_eq!(
            sandbox.list_files().await.unwrap(),
            vec!["README.md".to_string(), "src/routes/users.ts".to_string()]
        );
        assert!(sandbox.read_file("../outside").await.is_err());

        sandbox.delete_file("README.md").await.unwrap();
        sandbox.delete_file("README.md").await.unwrap();
        assert_eq!(sandbox.read_file("README.md").await.unwrap(), None);
        assert_eq!(sandbox.snapshot().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn template_is_copied_and_workspace_removed() {
        let template = tempfile::tempdir().unwrap();
        std::fs::write(template.path().join("package.json"), "{}").unwrap();
        std::fs::create_dir_all(template.path().join("node_modules/x")).unwrap();
        std::fs::write(template.path().join("node_modules/x/index.js"), "").unwrap();

        let root = tempfile::tempdir().unwrap();
        let provider = LocalSandboxProvider::new(root.path()).with_template(template.path());
        let sandbox = provider.open("p").await.unwrap();
        assert_eq!(sandbox.list_files().await.unwrap(), vec!["package.json".to_string()]);

        let dir = root.path().join(sandbox.id());
        assert!(dir.exists());
        provider.close(sandbox).await.unwrap();
        assert!(!dir.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn commands_run_in_workspace() {
        let root = tempfile::tempdir().unwrap();
        let provider = LocalSandboxProvider::new(root.path());
        let sandbox = provider.open("p").await.unwrap();
        sandbox.write_file("marker.txt", "hi").await.unwrap();

        let out = sandbox.run_command("ls", &[]).await.unwrap();
        assert!(out.success());
        assert!(out.stdout.contains("marker.txt"));

        let out = sandbox.run_command("sh", &["-c".into(), "exit 3".into()]).await.unwrap();
        assert_eq!(out.exit_code, 3);
    }
}
