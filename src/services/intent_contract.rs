//! Intent contract manager.
//!
//! Derives the success criteria for a build from the prompt, deterministically
//! and without any model call, and evaluates them against a workspace.

use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::models::{
    normalize_path, CriterionCheck, IntentContract, SuccessCriterion, WorkspaceSnapshot,
};

const ACTION_VERBS: &[&str] = &[
    "add", "create", "build", "implement", "make", "write", "generate", "fix", "update",
    "support", "expose", "integrate", "deploy", "remove", "refactor", "delete", "rename",
    "replace", "migrate", "enable", "disable", "configure", "set", "setup", "connect", "wire",
    "render", "show", "display", "store", "persist", "validate", "handle", "return", "allow",
    "extend", "move", "convert", "design", "scaffold", "include", "provide",
];

const FEATURE_NOUNS: &[&str] = &[
    "endpoint", "page", "screen", "route", "api", "component", "form", "button", "table",
    "test", "database", "auth", "login", "signup", "logout", "dashboard", "modal", "navbar",
    "sidebar", "schema", "migration", "model", "service", "handler", "controller", "webhook",
    "query", "mutation", "layout", "header", "footer", "menu", "chart", "list", "card",
    "upload", "search", "filter", "notification", "email", "payment", "checkout", "cart",
    "profile", "settings", "middleware", "hook", "store", "cache", "cli", "function", "view",
];

/// Nouns that describe *where* a feature lives rather than *what* it is.
const STRUCTURAL_NOUNS: &[&str] = &[
    "endpoint", "page", "screen", "route", "api", "component", "form", "button", "table",
    "test", "service", "handler", "controller", "function", "view", "layout", "feature",
    "file", "module", "app", "application", "project", "code", "new", "simple", "basic",
];

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "to", "for", "of", "in", "on", "at", "with", "by", "from", "that", "this",
    "it", "its", "is", "be", "are", "was", "and", "or", "but", "so", "my", "our", "your", "me",
    "we", "you", "i", "please", "can", "could", "would", "should", "will", "just", "also", "some",
    "all", "any", "each", "every", "which", "when", "where", "how", "what", "there", "then",
    "into", "onto", "out", "up", "down", "as", "if", "not", "no", "yes", "us", "them", "they",
    "via", "using", "use", "more", "less", "very", "really", "sure",
];

fn clause_splitter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)[.!?](?:\s+|$)|\r?\n|;\s*|\s+and\s+|,\s+then\s+")
            .unwrap_or_else(|e| panic!("invalid clause pattern: {e}"))
    })
}

fn bullet_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*\x{2022}]|\d+[.)])\s*")
            .unwrap_or_else(|e| panic!("invalid bullet pattern: {e}"))
    })
}

fn file_path_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?:\.{0,2}/)?(?:[\w@-]+/)*[\w@-]+\.(?:tsx?|jsx?|mjs|cjs|rs|py|go|java|kt|swift|rb|php|json|ya?ml|toml|md|css|scss|html|sql|vue|svelte|prisma|env|sh)\b",
        )
        .unwrap_or_else(|e| panic!("invalid path pattern: {e}"))
    })
}

/// Split a prompt into candidate clauses, dropping bullets and blanks.
fn split_clauses(prompt: &str) -> Vec<String> {
    clause_splitter()
        .split(prompt)
        .map(|c| bullet_prefix().replace(c, "").trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn words(clause: &str) -> Vec<String> {
    clause
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn singular(word: &str) -> &str {
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        &word[..word.len() - 1]
    } else {
        word
    }
}

fn is_actionable(tokens: &[String]) -> bool {
    tokens.iter().any(|w| {
        let w = w.as_str();
        ACTION_VERBS.contains(&w) || FEATURE_NOUNS.contains(&singular(w))
    })
}

/// Most specific keyword in a clause: the first word that is neither a verb,
/// a stop word nor a structural noun; then the first non-verb feature noun.
fn keyword(tokens: &[String]) -> Option<String> {
    let specific = tokens.iter().find(|w| {
        let w = w.as_str();
        w.len() >= 3
            && !w.chars().all(|c| c.is_ascii_digit())
            && !ACTION_VERBS.contains(&w)
            && !STOP_WORDS.contains(&w)
            && !STRUCTURAL_NOUNS.contains(&singular(w))
    });
    if let Some(word) = specific {
        return Some(word.clone());
    }
    tokens
        .iter()
        .find(|w| !ACTION_VERBS.contains(&w.as_str()) && !STOP_WORDS.contains(&w.as_str()))
        .map(|w| singular(w).to_string())
}

fn check_for_clause(clause: &str, tokens: &[String]) -> CriterionCheck {
    if let Some(found) = file_path_pattern().find(clause) {
        if let Some(path) = normalize_path(found.as_str()) {
            return CriterionCheck::FileExists { path };
        }
    }
    let pattern = keyword(tokens).unwrap_or_else(|| clause.to_lowercase());
    CriterionCheck::ContentMatches { pattern }
}

/// Service that owns criteria derivation and evaluation.
#[derive(Debug, Clone)]
pub struct IntentContractManager {
    max_criteria: usize,
}

impl Default for IntentContractManager {
    fn default() -> Self {
        Self { max_criteria: 25 }
    }
}

impl IntentContractManager {
    pub fn new(max_criteria: usize) -> Self {
        Self {
            max_criteria: max_criteria.max(1),
        }
    }

    /// Derive an unlocked contract from a prompt.
    ///
    /// Fails with [`BuildError::EmptyIntent`] when the prompt is blank or
    /// purely conversational.
    pub fn create_contract(&self, prompt: &str) -> BuildResult<IntentContract> {
        let trimmed = prompt.trim();
        if trimmed.is_empty() {
            return Err(BuildError::EmptyIntent);
        }

        let mut seen = HashSet::new();
        let mut criteria = Vec::new();
        for clause in split_clauses(trimmed) {
            let tokens = words(&clause);
            if !is_actionable(&tokens) {
                tracing::trace!(clause = %clause, "dropping non-actionable clause");
                continue;
            }
            if !seen.insert(clause.to_lowercase()) {
                continue;
            }
            if criteria.len() >= self.max_criteria {
                tracing::warn!(max = self.max_criteria, "criteria limit reached; ignoring remaining clauses");
                break;
            }
            criteria.push(SuccessCriterion {
                id: format!("SC-{:03}", criteria.len() + 1),
                check: check_for_clause(&clause, &tokens),
                description: clause,
            });
        }

        if criteria.is_empty() {
            return Err(BuildError::EmptyIntent);
        }

        tracing::debug!(criteria = criteria.len(), "intent contract derived");
        Ok(IntentContract::new(trimmed, criteria))
    }

    /// Derive and lock in one step.
    pub fn create_locked(&self, prompt: &str) -> BuildResult<IntentContract> {
        let mut contract = self.create_contract(prompt)?;
        contract.lock()?;
        Ok(contract)
    }

    /// Evaluate a contract against a workspace snapshot.
    pub fn evaluate(&self, contract: &IntentContract, snapshot: &WorkspaceSnapshot) -> BTreeMap<String, bool> {
        contract.evaluate(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_check_prompt_yields_one_criterion() {
        let contract = IntentContractManager::default()
            .create_contract("add a health-check endpoint")
            .unwrap();
        assert_eq!(contract.criteria().len(), 1);
        let criterion = &contract.criteria()[0];
        assert_eq!(criterion.id, "SC-001");
        assert_eq!(
            criterion.check,
            CriterionCheck::ContentMatches {
                pattern: "health".to_string()
            }
        );
    }

    #[test]
    fn empty_and_conversational_prompts_fail() {
        let manager = IntentContractManager::default();
        assert!(matches!(manager.create_contract(""), Err(BuildError::EmptyIntent)));
        assert!(matches!(manager.create_contract("   \n "), Err(BuildError::EmptyIntent)));
        assert!(matches!(
            manager.create_contract("Hi there! Thanks so much."),
            Err(BuildError::EmptyIntent)
        ));
    }

    #[test]
    fn splits_bullets_and_conjunctions() {
        let prompt = "Build a todo app:\n- add a login page\n- create routes/todos.ts and write tests";
        let contract = IntentContractManager::default().create_contract(prompt).unwrap();
        let descriptions: Vec<&str> = contract.criteria().iter().map(|c| c.description.as_str()).collect();
        assert_eq!(
            descriptions,
            vec!["Build a todo app:", "add a login page", "create routes/todos.ts", "write tests"]
        );
        assert_eq!(
            contract.criteria()[2].check,
            CriterionCheck::FileExists {
                path: "routes/todos.ts".to_string()
            }
        );
        assert_eq!(
            contract.criteria()[1].check,
            CriterionCheck::ContentMatches {
                pattern: "login".to_string()
            }
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let manager = IntentContractManager::default();
        let prompt = "Add a users API. Add a users API. Deploy it";
        let a = manager.create_contract(prompt).unwrap();
        let b = manager.create_contract(prompt).unwrap();
        assert_eq!(a.criteria(), b.criteria());
        assert_eq!(a.criteria().len(), 2);
    }

    #[test]
    fn respects_criteria_limit() {
        let manager = IntentContractManager::new(2);
        let contract = manager
            .create_contract("add a page. add a form. add a table")
            .unwrap();
        assert_eq!(contract.criteria().len(), 2);
    }

    #[test]
    fn locked_contract_evaluates() {
        let manager = IntentContractManager::default();
        let contract = manager.create_locked("add a health-check endpoint").unwrap();
        assert!(contract.is_locked());

        let mut snapshot = WorkspaceSnapshot::default();
        snapshot.insert("routes/status.ts", "export const health = () => 'ok';\n");
        let result = manager.evaluate(&contract, &snapshot);
        assert_eq!(result.get("SC-001"), Some(&true));
    }
}
