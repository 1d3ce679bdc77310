//! In-memory sandbox for tests and embedding.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::domain::errors::BuildResult;
use crate::domain::models::WorkspaceSnapshot;
use crate::domain::ports::{CommandOutput, Sandbox, SandboxProvider};

/// Workspace held in a map. Commands return canned output keyed by program
/// name, or a clean exit when nothing was configured.
#[derive(Debug, Default)]
pub struct InMemorySandbox {
    id: String,
    files: RwLock<BTreeMap<String, String>>,
    command_outputs: HashMap<String, CommandOutput>,
    commands_run: RwLock<Vec<String>>,
}

impl InMemorySandbox {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_file(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), content.into());
        self
    }

    pub fn with_command_output(mut self, program: impl Into<String>, output: CommandOutput) -> Self {
        self.command_outputs.insert(program.into(), output);
        self
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    /// Command lines run so far, program and args joined by spaces.
    pub fn commands_run(&self) -> Vec<String> {
        self.commands_run
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Sandbox for InMemorySandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn read_file(&self, path: &str) -> BuildResult<Option<String>> {
        Ok(self.content(path))
    }

    async fn write_file(&self, path: &str, content: &str) -> BuildResult<()> {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> BuildResult<()> {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        Ok(())
    }

    async fn list_files(&self) -> BuildResult<Vec<String>> {
        Ok(self
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }

    async fn run_command(&self, program: &str, args: &[String]) -> BuildResult<CommandOutput> {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.commands_run
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);

        Ok(self.command_outputs.get(program).cloned().unwrap_or(CommandOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }))
    }

    async fn snapshot(&self) -> BuildResult<WorkspaceSnapshot> {
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner).clone();
        Ok(WorkspaceSnapshot::new(files))
    }
}

/// Opens a fresh [`InMemorySandbox`] per build, optionally seeded with a
/// project's starting files.
#[derive(Debug, Default)]
pub struct InMemorySandboxProvider {
    seed: BTreeMap<String, String>,
    command_outputs: HashMap<String, CommandOutput>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    sandboxes: RwLock<Vec<Arc<InMemorySandbox>>>,
}

impl InMemorySandboxProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sandbox starts with this file.
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.seed.insert(path.into(), content.into());
        self
    }

    pub fn with_command_output(mut self, program: impl Into<String>, output: CommandOutput) -> Self {
        self.command_outputs.insert(program.into(), output);
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Every sandbox opened so far, in open order. Closing does not discard
    /// their contents.
    pub fn sandboxes(&self) -> Vec<Arc<InMemorySandbox>> {
        self.sandboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SandboxProvider for InMemorySandboxProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open(&self, project_id: &str) -> BuildResult<Arc<dyn Sandbox>> {
        let n = self.opened.fetch_add(1, Ordering::SeqCst);
        let mut sandbox = InMemorySandbox::new(format!("mem-{project_id}-{n}"));
        sandbox.command_outputs = self.command_outputs.clone();
        for (path, content) in &self.seed {
            sandbox = sandbox.with_file(path.clone(), content.clone());
        }
        debug!(sandbox_id = %sandbox.id, files = self.seed.len(), "opened in-memory sandbox");
        let sandbox = Arc::new(sandbox);
        self.sandboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&sandbox));
        Ok(sandbox)
    }

    async fn close(&self, sandbox: Arc<dyn Sandbox>) -> BuildResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        debug!(sandbox_id = %sandbox.id(), "closed in-memory sandbox");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sandboxes_are_isolated() {
        let provider = InMemorySandboxProvider::new().with_file("package.json", "{}");
        let a = provider.open("p").await.unwrap();
        let b = provider.open("p").await.unwrap();
        assert_ne!(a.id(), b.id());

        a.write_file("a.ts", "a").await.unwrap();
        assert_eq!(a.list_files().await.unwrap(), vec!["a.ts", "package.json"]);
        assert_eq!(b.read_file("a.ts").await.unwrap(), None);
        assert_eq!(b.read_file("package.json").await.unwrap().as_deref(), Some("{}"));

        provider.close(a).await.unwrap();
        assert_eq!((provider.opened(), provider.closed()), (2, 1));
    }

    #[tokio::test]
    async fn commands_default_to_success() {
        let sandbox = InMemorySandbox::new("s");
        let out = sandbox.run_command("npm", &["test".to_string()]).await.unwrap();
        assert!(out.success());
        assert_eq!(sandbox.commands_run(), vec!["npm test".to_string()]);
    }
}
