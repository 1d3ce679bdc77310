//! Sandbox port - interface for isolated build workspaces.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::errors::BuildResult;
use crate::domain::models::WorkspaceSnapshot;

/// Captured result of a command run inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty line of stderr, falling back to stdout.
    pub fn tail(&self) -> &str {
        last_line(&self.stderr)
            .or_else(|| last_line(&self.stdout))
            .unwrap_or("")
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().find(|l| !l.trim().is_empty()).map(str::trim)
}

/// Handle to one open workspace.
///
/// Paths are workspace-relative and normalised by the caller. Implementations
/// must tolerate concurrent calls on distinct paths.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Provider-assigned identifier.
    fn id(&self) -> &str;

    /// Read a file; `None` if it does not exist.
    async fn read_file(&self, path: &str) -> BuildResult<Option<String>>;

    /// Create or overwrite a file, creating parent directories.
    async fn write_file(&self, path: &str, content: &str) -> BuildResult<()>;

    /// Remove a file. Removing a missing file is not an error.
    async fn delete_file(&self, path: &str) -> BuildResult<()>;

    /// All file paths in the workspace.
    async fn list_files(&self) -> BuildResult<Vec<String>>;

    /// Run a program with the workspace as working directory.
    async fn run_command(&self, program: &str, args: &[String]) -> BuildResult<CommandOutput>;

    /// Copy every file into an immutable snapshot.
    async fn snapshot(&self) -> BuildResult<WorkspaceSnapshot> {
        let mut snapshot = WorkspaceSnapshot::default();
        for path in self.list_files().await? {
            if let Some(content) = self.read_file(&path).await? {
                snapshot.insert(path, content);
            }
        }
        Ok(snapshot)
    }
}

/// Opens and closes sandboxes for projects.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Open a fresh sandbox for a project.
    async fn open(&self, project_id: &str) -> BuildResult<Arc<dyn Sandbox>>;

    /// Release a sandbox. Called exactly once per opened sandbox.
    async fn close(&self, sandbox: Arc<dyn Sandbox>) -> BuildResult<()>;
}
