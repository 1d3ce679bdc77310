//! Context broadcast bus shared by the agents of one build.
//!
//! Append-only, in-memory and synchronised: a query returns every entry
//! published before it was called, in publish order. The bus lives exactly as
//! long as its build session.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::domain::models::{ContextEntry, Discovery};
use crate::services::progress_bus::{ProgressBus, ProgressPayload};

/// An agent known to the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRegistration {
    pub agent_id: String,
    pub task_description: String,
}

#[derive(Debug, Default)]
struct BusInner {
    agents: HashMap<String, AgentRegistration>,
    entries: Vec<ContextEntry>,
}

/// Per-build publish/query store for agent discoveries.
pub struct ContextBus {
    build_id: Uuid,
    inner: RwLock<BusInner>,
    progress: Option<Arc<ProgressBus>>,
}

impl ContextBus {
    pub fn new(build_id: Uuid) -> Self {
        Self {
            build_id,
            inner: RwLock::new(BusInner::default()),
            progress: None,
        }
    }

    /// Forward entries of interest to a progress bus.
    pub fn with_progress(mut self, progress: Arc<ProgressBus>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn build_id(&self) -> Uuid {
        self.build_id
    }

    /// Register an agent. Registering an id twice returns the existing
    /// registration unchanged.
    pub fn register_agent(&self, agent_id: &str, task_description: &str) -> AgentRegistration {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .agents
            .entry(agent_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(build_id = %self.build_id, agent_id, "agent registered on context bus");
                AgentRegistration {
                    agent_id: agent_id.to_string(),
                    task_description: task_description.to_string(),
                }
            })
            .clone()
    }

    pub fn registration(&self, agent_id: &str) -> Option<AgentRegistration> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.agents.get(agent_id).cloned()
    }

    /// Append an entry. Unregistered publishers are registered with an empty
    /// task description so nothing is dropped.
    pub fn publish(&self, agent_id: &str, discovery: Discovery) -> ContextEntry {
        let entry = {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            let source_task = inner
                .agents
                .entry(agent_id.to_string())
                .or_insert_with(|| AgentRegistration {
                    agent_id: agent_id.to_string(),
                    task_description: String::new(),
                })
                .task_description
                .clone();
            let entry = ContextEntry {
                sequence: inner.entries.len() as u64,
                source_agent_id: agent_id.to_string(),
                source_task,
                kind: discovery.kind,
                summary: discovery.summary,
                details: discovery.details,
                timestamp: Utc::now(),
            };
            inner.entries.push(entry.clone());
            entry
        };

        tracing::debug!(
            build_id = %self.build_id,
            agent_id,
            sequence = entry.sequence,
            kind = entry.kind.as_str(),
            "context entry published"
        );

        if entry.kind.is_of_interest() {
            if let Some(progress) = &self.progress {
                progress.emit(
                    self.build_id,
                    ProgressPayload::ContextPublished {
                        agent_id: agent_id.to_string(),
                        kind: entry.kind,
                        summary: entry.summary.clone(),
                    },
                );
            }
        }
        entry
    }

    /// Entries visible to `agent_id`, in publish order.
    ///
    /// `task_filter` keeps entries whose source task description contains it
    /// (case-insensitive). `exclude_self` drops the requester's own entries.
    pub fn query(&self, agent_id: &str, task_filter: Option<&str>, exclude_self: bool) -> Vec<ContextEntry> {
        let filter = task_filter.map(str::to_lowercase);
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .iter()
            .filter(|e| !(exclude_self && e.source_agent_id == agent_id))
            .filter(|e| {
                filter
                    .as_deref()
                    .map_or(true, |f| e.source_task.to_lowercase().contains(f))
            })
            .cloned()
            .collect()
    }

    /// Whether any agent other than `agent_id` has announced `path`.
    pub fn path_claimed_by_other(&self, agent_id: &str, path: &str) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .iter()
            .find(|e| e.source_agent_id != agent_id && e.path() == Some(path))
            .map(|e| e.source_agent_id.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn agent_count(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).agents.len()
    }
}
