//! Merge outcome records.

use serde::{Deserialize, Serialize};

/// How a multi-agent overlap on one path was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictClass {
    /// Edits touch different regions of a file that existed before the build.
    DisjointEdit,
    /// Versions agree, or one extends another.
    CompatibleOverlap,
    /// Versions disagree in the same region.
    TrueConflict,
}

/// Rule applied to settle an overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    IdenticalContent,
    SupersetContent,
    ThreeWayMerge,
    PreferPriority,
    /// No rule applied; the conflict is unresolved.
    Unresolved,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdenticalContent => "identical_content",
            Self::SupersetContent => "superset_content",
            Self::ThreeWayMerge => "three_way_merge",
            Self::PreferPriority => "prefer_priority",
            Self::Unresolved => "unresolved",
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One path touched by more than one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConflict {
    pub path: String,
    /// Agent ids in priority order.
    pub conflicting_agents: Vec<String>,
    pub class: ConflictClass,
    pub resolution_strategy: ResolutionStrategy,
    pub resolved: bool,
}

/// Outcome of reconciling all agent outputs into one workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub conflicts: Vec<MergeConflict>,
    /// Paths written to the workspace by the merge, in path order.
    pub merged_paths: Vec<String>,
    /// Paths removed from the workspace by the merge.
    pub deleted_paths: Vec<String>,
    /// Paths only failed agents touched, put back to their baseline state.
    #[serde(default)]
    pub reverted_paths: Vec<String>,
    pub success: bool,
}

impl MergeReport {
    pub fn new(conflicts: Vec<MergeConflict>, merged_paths: Vec<String>, deleted_paths: Vec<String>) -> Self {
        let success = conflicts.iter().all(|c| c.resolved);
        Self {
            conflicts,
            merged_paths,
            deleted_paths,
            reverted_paths: Vec::new(),
            success,
        }
    }

    pub fn with_reverted_paths(mut self, reverted_paths: Vec<String>) -> Self {
        self.reverted_paths = reverted_paths;
        self
    }

    pub fn unresolved_paths(&self) -> Vec<String> {
        self.conflicts
            .iter()
            .filter(|c| !c.resolved)
            .map(|c| c.path.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict(path: &str, resolved: bool) -> MergeConflict {
        MergeConflict {
            path: path.to_string(),
            conflicting_agents: vec!["a".into(), "b".into()],
            class: ConflictClass::TrueConflict,
            resolution_strategy: if resolved {
                ResolutionStrategy::PreferPriority
            } else {
                ResolutionStrategy::Unresolved
            },
            resolved,
        }
    }

    #[test]
    fn success_requires_every_conflict_resolved() {
        assert!(MergeReport::new(vec![], vec![], vec![]).success);
        assert!(MergeReport::new(vec![conflict("a", true)], vec![], vec![]).success);

        let report = MergeReport::new(vec![conflict("a", true), conflict("b", false)], vec![], vec![]);
        assert!(!report.success);
        assert_eq!(report.unresolved_paths(), vec!["b".to_string()]);
    }
}
