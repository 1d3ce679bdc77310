//! Merge resolver.
//!
//! Reconciles the final outputs of completed agent tasks into one workspace
//! state. Resolution is a pure function of the baseline snapshot and the
//! task outputs in declared priority order; the sandbox is only written once
//! the plan is computed. Paths written only by agents that did not complete
//! are restored to the baseline.

use similar::{DiffTag, TextDiff};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use tracing::{debug, info, warn};

use crate::domain::errors::BuildResult;
use crate::domain::models::{
    AgentTask, AgentTaskStatus, ConflictClass, ConflictPolicy, MergeConflict, MergeReport,
    ResolutionStrategy, WorkspaceSnapshot,
};
use crate::domain::ports::Sandbox;

/// One agent's final version of a path. `None` content is a deletion.
#[derive(Debug, Clone)]
struct Version<'a> {
    agent_id: &'a str,
    content: Option<&'a str>,
}

/// A contiguous edit against the baseline.
#[derive(Debug, Clone)]
struct Hunk {
    old: Range<usize>,
    lines: String,
}

impl Hunk {
    fn overlaps(&self, other: &Hunk) -> bool {
        self.old.start == other.old.start
            || (self.old.start < other.old.end && other.old.start < self.old.end)
    }
}

/// Result of resolving a single path.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Resolution {
    content: Option<String>,
    conflict: Option<MergeConflict>,
}

/// Computed merge: final content per path plus the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    /// Final content per touched path; `None` deletes the path.
    pub writes: BTreeMap<String, Option<String>>,
    pub report: MergeReport,
}

fn normalized(content: &str) -> String {
    content
        .replace("\r\n", "\n")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}

fn normalized_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect()
}

/// Whether `needle` appears in `haystack` as an ordered subsequence.
fn is_subsequence(needle: &[&str], haystack: &[&str]) -> bool {
    let mut rest = haystack.iter();
    needle.iter().all(|line| rest.any(|candidate| candidate == line))
}

fn hunks(base: &str, new: &str) -> Vec<Hunk> {
    let diff = TextDiff::from_lines(base, new);
    let new_slices = diff.new_slices();
    diff.ops()
        .iter()
        .filter(|op| op.tag() != DiffTag::Equal)
        .map(|op| Hunk {
            old: op.old_range(),
            lines: new_slices[op.new_range()].concat(),
        })
        .collect()
}

/// Apply non-overlapping hunks from several agents to the baseline.
fn three_way(base: &str, versions: &[&str]) -> Option<String> {
    let mut all: Vec<Hunk> = Vec::new();
    for version in versions {
        let own = hunks(base, version);
        if own.iter().any(|hunk| all.iter().any(|h| h.overlaps(hunk))) {
            return None;
        }
        all.extend(own);
    }
    all.sort_by_key(|h| (h.old.start, h.old.end));

    let base_lines: Vec<&str> = base.split_inclusive('\n').collect();
    let mut merged = String::with_capacity(base.len());
    let mut cursor = 0;
    for hunk in &all {
        merged.push_str(&base_lines[cursor..hunk.old.start].concat());
        merged.push_str(&hunk.lines);
        cursor = hunk.old.end;
    }
    merged.push_str(&base_lines[cursor..].concat());
    Some(merged)
}

/// Reconciles agent outputs into the shared workspace.
#[derive(Debug, Clone, Default)]
pub struct MergeResolver {
    policy: ConflictPolicy,
}

impl MergeResolver {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Compute the merge without touching any sandbox.
    ///
    /// Only completed tasks contribute. Tasks are ordered by declared
    /// priority (lower first), ties broken by their position in `tasks`.
    /// Anything else a non-completed task touched is reverted to `baseline`.
    pub fn plan(&self, baseline: &WorkspaceSnapshot, tasks: &[AgentTask]) -> MergePlan {
        let mut ordered: Vec<(usize, &AgentTask)> = tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.status == AgentTaskStatus::Completed)
            .collect();
        ordered.sort_by_key(|(idx, t)| (t.priority(), *idx));

        let finals: Vec<(&str, BTreeMap<String, Option<String>>)> = ordered
            .iter()
            .map(|(_, t)| (t.agent_id.as_str(), t.final_writes()))
            .collect();

        let mut touched: BTreeMap<&str, Vec<Version<'_>>> = BTreeMap::new();
        for (agent_id, writes) in &finals {
            for (path, content) in writes {
                touched.entry(path.as_str()).or_default().push(Version {
                    agent_id,
                    content: content.as_deref(),
                });
            }
        }

        let mut writes = BTreeMap::new();
        let mut conflicts = Vec::new();
        let mut merged_paths = Vec::new();
        let mut deleted_paths = Vec::new();

        for (path, versions) in touched {
            let resolution = self.resolve(path, baseline.get(path), &versions);
            match &resolution.content {
                Some(_) => merged_paths.push(path.to_string()),
                None => deleted_paths.push(path.to_string()),
            }
            if let Some(conflict) = resolution.conflict {
                debug!(
                    path,
                    class = ?conflict.class,
                    strategy = %conflict.resolution_strategy,
                    resolved = conflict.resolved,
                    "classified multi-agent path"
                );
                conflicts.push(conflict);
            }
            writes.insert(path.to_string(), resolution.content);
        }

        let mut reverted_paths = Vec::new();
        let abandoned: BTreeSet<String> = tasks
            .iter()
            .filter(|t| t.status != AgentTaskStatus::Completed)
            .flat_map(|t| t.output.iter().map(|c| c.path.clone()))
            .collect();
        for path in abandoned {
            if writes.contains_key(&path) {
                continue;
            }
            writes.insert(path.clone(), baseline.get(&path).map(str::to_string));
            reverted_paths.push(path);
        }

        MergePlan {
            writes,
            report: MergeReport::new(conflicts, merged_paths, deleted_paths)
                .with_reverted_paths(reverted_paths),
        }
    }

    fn resolve(&self, path: &str, base: Option<&str>, versions: &[Version<'_>]) -> Resolution {
        let winner = versions[0].content.map(str::to_string);
        if versions.len() == 1 {
            return Resolution {
                content: winner,
                conflict: None,
            };
        }

        let agents: Vec<String> = versions.iter().map(|v| v.agent_id.to_string()).collect();
        let conflict = |class, strategy, resolved| MergeConflict {
            path: path.to_string(),
            conflicting_agents: agents.clone(),
            class,
            resolution_strategy: strategy,
            resolved,
        };

        let contents: Vec<&str> = versions.iter().filter_map(|v| v.content).collect();

        if contents.is_empty() {
            return Resolution {
                content: None,
                conflict: Some(conflict(
                    ConflictClass::CompatibleOverlap,
                    ResolutionStrategy::IdenticalContent,
                    true,
                )),
            };
        }

        if contents.len() == versions.len() {
            let first = normalized(contents[0]);
            if contents.iter().skip(1).all(|c| normalized(c) == first) {
                return Resolution {
                    content: winner,
                    conflict: Some(conflict(
                        ConflictClass::CompatibleOverlap,
                        ResolutionStrategy::IdenticalContent,
                        true,
                    )),
                };
            }

            let lines: Vec<Vec<&str>> = contents.iter().map(|c| normalized_lines(c)).collect();
            let superset = (0..lines.len()).find(|&i| {
                (0..lines.len()).all(|j| i == j || is_subsequence(&lines[j], &lines[i]))
            });
            if let Some(i) = superset {
                return Resolution {
                    content: Some(contents[i].to_string()),
                    conflict: Some(conflict(
                        ConflictClass::CompatibleOverlap,
                        ResolutionStrategy::SupersetContent,
                        true,
                    )),
                };
            }

            if let Some(merged) = base.and_then(|base| three_way(base, &contents)) {
                return Resolution {
                    content: Some(merged),
                    conflict: Some(conflict(
                        ConflictClass::DisjointEdit,
                        ResolutionStrategy::ThreeWayMerge,
                        true,
                    )),
                };
            }
        }

        let (strategy, resolved) = match self.policy {
            ConflictPolicy::PreferPriority => (ResolutionStrategy::PreferPriority, true),
            ConflictPolicy::Fail => (ResolutionStrategy::Unresolved, false),
        };
        Resolution {
            content: winner,
            conflict: Some(conflict(ConflictClass::TrueConflict, strategy, resolved)),
        }
    }

    /// Merge completed task outputs into the sandbox.
    ///
    /// Task records are read only; the sandbox ends in the planned state even
    /// when conflicts remain unresolved.
    pub async fn merge(
        &self,
        sandbox: &dyn Sandbox,
        baseline: &WorkspaceSnapshot,
        tasks: &[AgentTask],
    ) -> BuildResult<MergeReport> {
        let plan = self.plan(baseline, tasks);

        for (path, content) in &plan.writes {
            match content {
                Some(content) => sandbox.write_file(path, content).await?,
                None => sandbox.delete_file(path).await?,
            }
        }

        let report = plan.report;
        if report.success {
            info!(
                sandbox_id = sandbox.id(),
                merged = report.merged_paths.len(),
                deleted = report.deleted_paths.len(),
                reverted = report.reverted_paths.len(),
                conflicts = report.conflicts.len(),
                "merge completed"
            );
        } else {
            warn!(
                sandbox_id = sandbox.id(),
                unresolved = ?report.unresolved_paths(),
                "merge left unresolved conflicts"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{FileChange, WorkPartition};

    fn completed(id: &str, priority: u32, writes: &[(&str, Option<&str>)]) -> AgentTask {
        let mut task = AgentTask::new(WorkPartition::new(id, id).with_priority(priority));
        task.mark_running();
        for (path, content) in writes {
            task.output.push(match content {
                Some(c) => FileChange::write(*path, *c),
                None => FileChange::delete(*path),
            });
        }
        task.mark_completed(None);
        task
    }

    fn plan(tasks: &[AgentTask]) -> MergePlan {
        MergeResolver::default().plan(&WorkspaceSnapshot::default(), tasks)
    }

    #[test]
    fn disjoint_paths_have_no_conflicts() {
        let result = plan(&[
            completed("api", 0, &[("routes/health.ts", Some("a"))]),
            completed("tests", 1, &[("tests/health.test.ts", Some("b"))]),
        ]);
        assert!(result.report.success);
        assert!(result.report.conflicts.is_empty());
        assert_eq!(result.report.merged_paths.len(), 2);
    }

    #[test]
    fn identical_after_normalisation_is_compatible() {
        let result = plan(&[
            completed("a", 0, &[("x.ts", Some("line one\r\nline two  \n"))]),
            completed("b", 1, &[("x.ts", Some("line one\nline two\n\n"))]),
        ]);
        let conflict = &result.report.conflicts[0];
        assert_eq!(conflict.class, ConflictClass::CompatibleOverlap);
        assert_eq!(conflict.resolution_strategy, ResolutionStrategy::IdenticalContent);
        assert_eq!(result.writes["x.ts"].as_deref(), Some("line one\r\nline two  \n"));
    }

    #[test]
    fn superset_wins() {
        let result = plan(&[
            completed("a", 0, &[("x.ts", Some("import a;\nexport const x = 1;\n"))]),
            completed("b", 1, &[("x.ts", Some("import a;\nimport b;\nexport const x = 1;\nexport const y = 2;\n"))]),
        ]);
        assert!(result.report.success);
        assert_eq!(result.report.conflicts[0].resolution_strategy, ResolutionStrategy::SupersetContent);
        assert!(result.writes["x.ts"].as_deref().unwrap().contains("import b;"));
    }

    #[test]
    fn disjoint_hunks_merge_against_baseline() {
        let mut baseline = WorkspaceSnapshot::default();
        baseline.insert("app.ts", "one\ntwo\nthree\nfour\nfive\n");
        let tasks = [
            completed("a", 0, &[("app.ts", Some("ONE\ntwo\nthree\nfour\nfive\n"))]),
            completed("b", 1, &[("app.ts", Some("one\ntwo\nthree\nfour\nFIVE\n"))]),
        ];
        let result = MergeResolver::default().plan(&baseline, &tasks);
        assert!(result.report.success);
        assert_eq!(result.report.conflicts[0].class, ConflictClass::DisjointEdit);
        assert_eq!(result.writes["app.ts"].as_deref(), Some("ONE\ntwo\nthree\nfour\nFIVE\n"));
    }

    #[test]
    fn incompatible_content_is_unresolved_by_default() {
        let tasks = [
            completed("a", 0, &[("routes/users.ts", Some("export const users = [];\n"))]),
            completed("b", 1, &[("routes/users.ts", Some("module.exports = {};\n"))]),
        ];
        let result = plan(&tasks);
        assert!(!result.report.success);
        assert_eq!(result.report.unresolved_paths(), vec!["routes/users.ts".to_string()]);
        assert_eq!(result.writes["routes/users.ts"].as_deref(), Some("export const users = [];\n"));

        let preferred = MergeResolver::new(ConflictPolicy::PreferPriority).plan(&WorkspaceSnapshot::default(), &tasks);
        assert!(preferred.report.success);
        assert_eq!(preferred.report.conflicts[0].resolution_strategy, ResolutionStrategy::PreferPriority);
    }

    #[test]
    fn priority_orders_versions_not_input_position() {
        let tasks = [
            completed("low", 5, &[("x.ts", Some("low\n"))]),
            completed("high", 1, &[("x.ts", Some("high\n"))]),
        ];
        let result = MergeResolver::new(ConflictPolicy::PreferPriority).plan(&WorkspaceSnapshot::default(), &tasks);
        assert_eq!(result.writes["x.ts"].as_deref(), Some("high\n"));
        assert_eq!(result.report.conflicts[0].conflicting_agents, vec!["agent-high", "agent-low"]);
    }

    #[test]
    fn deletions() {
        let both = plan(&[
            completed("a", 0, &[("old.ts", None)]),
            completed("b", 1, &[("old.ts", None)]),
        ]);
        assert!(both.report.success);
        assert_eq!(both.report.deleted_paths, vec!["old.ts".to_string()]);

        let mixed = plan(&[
            completed("a", 0, &[("old.ts", None)]),
            completed("b", 1, &[("old.ts", Some("keep"))]),
        ]);
        assert!(!mixed.report.success);
        assert_eq!(mixed.report.conflicts[0].class, ConflictClass::TrueConflict);
    }

    #[test]
    fn failed_tasks_do_not_contribute() {
        let mut failed = AgentTask::new(WorkPartition::new("f", "f"));
        failed.output.push(FileChange::write("x.ts", "broken"));
        failed.mark_failed(crate::domain::models::AgentFailure::permanent("boom"));

        let result = plan(&[completed("a", 0, &[("x.ts", Some("ok"))]), failed]);
        assert!(result.report.conflicts.is_empty());
        assert_eq!(result.writes["x.ts"].as_deref(), Some("ok"));
        assert!(result.report.reverted_paths.is_empty());
    }

    fn failed(id: &str, writes: &[(&str, Option<&str>)]) -> AgentTask {
        let mut task = AgentTask::new(WorkPartition::new(id, id));
        task.mark_running();
        for (path, content) in writes {
            task.output.push(match content {
                Some(c) => FileChange::write(*path, *c),
                None => FileChange::delete(*path),
            });
        }
        task.mark_failed(crate::domain::models::AgentFailure::permanent("boom"));
        task
    }

    #[tokio::test]
    async fn merge_reverts_paths_only_failed_tasks_touched() {
        use crate::adapters::sandbox::InMemorySandbox;

        let mut baseline = WorkspaceSnapshot::default();
        baseline.insert("package.json", "{}\n");
        baseline.insert("legacy.ts", "old\n");
        let sandbox = InMemorySandbox::new("s")
            .with_file("package.json", "{ broken\n")
            .with_file("a.ts", "export const a = 1;\n")
            .with_file("junk.ts", "// TODO\n");

        let tasks = [
            completed("good", 0, &[("a.ts", Some("export const a = 1;\n"))]),
            failed(
                "bad",
                &[
                    ("junk.ts", Some("// TODO\n")),
                    ("package.json", Some("{ broken\n")),
                    ("legacy.ts", None),
                    ("a.ts", Some("half written")),
                ],
            ),
        ];
        let report = MergeResolver::default()
            .merge(&sandbox, &baseline, &tasks)
            .await
            .unwrap();

        assert_eq!(report.merged_paths, vec!["a.ts".to_string()]);
        assert_eq!(
            report.reverted_paths,
            vec!["junk.ts".to_string(), "legacy.ts".to_string(), "package.json".to_string()]
        );
        assert!(!sandbox.contains("junk.ts"));
        assert_eq!(sandbox.content("package.json").as_deref(), Some("{}\n"));
        assert_eq!(sandbox.content("legacy.ts").as_deref(), Some("old\n"));
        assert_eq!(sandbox.content("a.ts").as_deref(), Some("export const a = 1;\n"));
    }

    #[test]
    fn plan_is_deterministic() {
        let tasks = [
            completed("a", 0, &[("x.ts", Some("a\n")), ("y.ts", Some("y\n"))]),
            completed("b", 0, &[("x.ts", Some("b\n"))]),
        ];
        let first = plan(&tasks);
        for _ in 0..5 {
            assert_eq!(plan(&tasks), first);
        }
    }
}
