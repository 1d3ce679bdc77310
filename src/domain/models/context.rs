//! Shared-context entries exchanged between concurrently running agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What kind of fact a discovery announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryKind {
    /// A file was created or claimed.
    FileCreated,
    /// A design decision other agents should follow (naming, schema, route).
    Decision,
    /// The agent noticed overlapping work.
    ConflictDetected,
    /// Anything else.
    Note,
}

impl DiscoveryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileCreated => "file_created",
            Self::Decision => "decision",
            Self::ConflictDetected => "conflict_detected",
            Self::Note => "note",
        }
    }

    /// Whether entries of this kind are forwarded to progress consumers.
    pub fn is_of_interest(&self) -> bool {
        matches!(self, Self::Decision | Self::ConflictDetected)
    }
}

/// Structured fact an agent publishes while it works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    pub kind: DiscoveryKind,
    pub summary: String,
    /// Opaque key/value payload.
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl Discovery {
    pub fn new(kind: DiscoveryKind, summary: impl Into<String>) -> Self {
        Self {
            kind,
            summary: summary.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn file_created(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(DiscoveryKind::FileCreated, format!("created {path}"))
            .with_detail("path", serde_json::Value::String(path))
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// The `path` detail, if the discovery carries one.
    pub fn path(&self) -> Option<&str> {
        self.details.get("path").and_then(|v| v.as_str())
    }
}

/// One fact stored on the context bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Position on the bus, starting at 0. Strictly increasing in publish order.
    pub sequence: u64,
    pub source_agent_id: String,
    /// Task description the source agent registered with.
    pub source_task: String,
    pub kind: DiscoveryKind,
    pub summary: String,
    pub details: BTreeMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl ContextEntry {
    pub fn path(&self) -> Option<&str> {
        self.details.get("path").and_then(|v| v.as_str())
    }
}
