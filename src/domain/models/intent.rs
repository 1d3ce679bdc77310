//! Intent contract domain model.
//!
//! The intent contract is the "definition of done" for a build: an ordered
//! list of checkable success criteria, locked before any code is written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::workspace::WorkspaceSnapshot;
use crate::domain::errors::{BuildError, BuildResult};

/// Machine-checkable form of a success criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CriterionCheck {
    /// A file exists at exactly this workspace-relative path.
    FileExists { path: String },
    /// At least one file lives under this path prefix.
    PathPrefixExists { prefix: String },
    /// Some file's content contains the pattern (case-insensitive literal).
    ContentMatches { pattern: String },
    /// No file contains any of the given markers.
    NoPlaceholders { markers: Vec<String> },
    /// Every nested check holds.
    All { checks: Vec<CriterionCheck> },
}

impl CriterionCheck {
    /// Evaluate the check against a workspace snapshot.
    pub fn evaluate(&self, snapshot: &WorkspaceSnapshot) -> bool {
        match self {
            Self::FileExists { path } => snapshot.contains(path),
            Self::PathPrefixExists { prefix } => snapshot.paths().any(|p| p.starts_with(prefix.as_str())),
            Self::ContentMatches { pattern } => {
                let needle = pattern.to_lowercase();
                snapshot
                    .files()
                    .any(|(_, content)| content.to_lowercase().contains(&needle))
            }
            Self::NoPlaceholders { markers } => {
                let markers: Vec<String> = markers.iter().map(|m| m.to_lowercase()).collect();
                !snapshot.files().any(|(_, content)| {
                    let lower = content.to_lowercase();
                    markers.iter().any(|m| lower.contains(m.as_str()))
                })
            }
            Self::All { checks } => checks.iter().all(|c| c.evaluate(snapshot)),
        }
    }
}

/// One success criterion of an intent contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessCriterion {
    /// Unique id within the contract, e.g. `SC-001`.
    pub id: String,
    /// Human-readable statement.
    pub description: String,
    /// Machine-checkable form.
    pub check: CriterionCheck,
}

/// The locked "definition of done" for a build session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentContract {
    /// The prompt the contract was derived from.
    pub prompt: String,
    criteria: Vec<SuccessCriterion>,
    /// Highest criterion number handed out, removed criteria included.
    #[serde(default)]
    issued: usize,
    locked: bool,
    pub created_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
}

impl IntentContract {
    /// Create an unlocked contract from already-derived criteria.
    pub fn new(prompt: impl Into<String>, criteria: Vec<SuccessCriterion>) -> Self {
        Self {
            prompt: prompt.into(),
            criteria,
            issued: 0,
            locked: false,
            created_at: Utc::now(),
            locked_at: None,
        }
    }

    pub fn criteria(&self) -> &[SuccessCriterion] {
        &self.criteria
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    fn next_number(&self) -> usize {
        let highest = self
            .criteria
            .iter()
            .filter_map(|c| c.id.strip_prefix("SC-")?.parse::<usize>().ok())
            .max()
            .unwrap_or(0);
        highest.max(self.issued) + 1
    }

    /// Append a criterion. Fails once the contract is locked.
    pub fn add_criterion(&mut self, description: impl Into<String>, check: CriterionCheck) -> BuildResult<&SuccessCriterion> {
        if self.locked {
            return Err(BuildError::ContractLocked);
        }
        let number = self.next_number();
        self.issued = number;
        let id = format!("SC-{number:03}");
        self.criteria.push(SuccessCriterion {
            id,
            description: description.into(),
            check,
        });
        Ok(&self.criteria[self.criteria.len() - 1])
    }

    /// Remove a criterion by id. Fails once the contract is locked.
    pub fn remove_criterion(&mut self, id: &str) -> BuildResult<Option<SuccessCriterion>> {
        if self.locked {
            return Err(BuildError::ContractLocked);
        }
        let position = self.criteria.iter().position(|c| c.id == id);
        Ok(position.map(|idx| self.criteria.remove(idx)))
    }

    /// Lock the contract. Locking an empty contract is rejected; locking
    /// twice is a no-op.
    pub fn lock(&mut self) -> BuildResult<()> {
        if self.criteria.is_empty() {
            return Err(BuildError::EmptyIntent);
        }
        if !self.locked {
            self.locked = true;
            self.locked_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Evaluate every criterion against the snapshot.
    ///
    /// Deterministic: the same contract and snapshot always produce the
    /// same map.
    pub fn evaluate(&self, snapshot: &WorkspaceSnapshot) -> BTreeMap<String, bool> {
        self.criteria
            .iter()
            .map(|c| (c.id.clone(), c.check.evaluate(snapshot)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract() -> IntentContract {
        IntentContract::new(
            "add a health-check endpoint",
            vec![SuccessCriterion {
                id: "SC-001".to_string(),
                description: "add a health-check endpoint".to_string(),
                check: CriterionCheck::ContentMatches {
                    pattern: "health".to_string(),
                },
            }],
        )
    }

    #[test]
    fn locked_contract_rejects_mutation() {
        let mut c = contract();
        c.lock().unwrap();
        assert!(c.is_locked());

        let err = c
            .add_criterion("extra", CriterionCheck::FileExists { path: "x".into() })
            .unwrap_err();
        assert!(matches!(err, BuildError::ContractLocked));
        assert!(matches!(c.remove_criterion("SC-001"), Err(BuildError::ContractLocked)));
        assert_eq!(c.criteria().len(), 1);
    }

    #[test]
    fn lock_is_idempotent() {
        let mut c = contract();
        c.lock().unwrap();
        let first = c.locked_at;
        c.lock().unwrap();
        assert_eq!(c.locked_at, first);
    }

    #[test]
    fn empty_contract_cannot_lock() {
        let mut c = IntentContract::new("hi", vec![]);
        assert!(matches!(c.lock(), Err(BuildError::EmptyIntent)));
    }

    #[test]
    fn add_assigns_sequential_ids() {
        let mut c = contract();
        let id = c
            .add_criterion("has tests", CriterionCheck::PathPrefixExists { prefix: "tests/".into() })
            .unwrap()
            .id
            .clone();
        assert_eq!(id, "SC-002");
    }

    #[test]
    fn ids_are_never_reused_after_removal() {
        let mut c = IntentContract::new("build a login form", vec![]);
        let check = || CriterionCheck::ContentMatches { pattern: "login".into() };
        c.add_criterion("a", check()).unwrap();
        c.add_criterion("b", check()).unwrap();
        c.remove_criterion("SC-001").unwrap();
        c.add_criterion("c", check()).unwrap();
        c.remove_criterion("SC-003").unwrap();
        c.add_criterion("d", check()).unwrap();

        let ids: Vec<&str> = c.criteria().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["SC-002", "SC-004"]);
        assert_eq!(c.evaluate(&WorkspaceSnapshot::default()).len(), 2);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let mut c = contract();
        c.add_criterion("route file", CriterionCheck::FileExists { path: "routes/health.ts".into() })
            .unwrap();
        c.lock().unwrap();

        let mut snapshot = WorkspaceSnapshot::default();
        snapshot.insert("routes/health.ts", "export const HEALTH = 'ok';\n");

        let first = c.evaluate(&snapshot);
        let second = c.evaluate(&snapshot);
        assert_eq!(first, second);
        assert_eq!(first.get("SC-001"), Some(&true));
        assert_eq!(first.get("SC-002"), Some(&true));
    }

    #[test]
    fn no_placeholders_check() {
        let check = CriterionCheck::NoPlaceholders {
            markers: vec!["TODO".to_string()],
        };
        let mut snapshot = WorkspaceSnapshot::default();
        snapshot.insert("a.ts", "const a = 1;\n");
        assert!(check.evaluate(&snapshot));
        snapshot.insert("b.ts", "// todo: finish\n");
        assert!(!check.evaluate(&snapshot));
    }
}
