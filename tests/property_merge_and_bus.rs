//! Property tests for merge determinism and context bus visibility.

use proptest::prelude::*;
use std::collections::BTreeMap;
use uuid::Uuid;

use kriptik::domain::models::{
    AgentTask, ConflictPolicy, Discovery, DiscoveryKind, FileChange, WorkPartition, WorkspaceSnapshot,
};
use kriptik::services::{ContextBus, MergeResolver};

const PATHS: [&str; 5] = [
    "routes/users.ts",
    "routes/health.ts",
    "src/db.ts",
    "src/app.ts",
    "README.md",
];

/// One agent's output: (path index, content variant or deletion).
fn agent_output() -> impl Strategy<Value = Vec<(usize, Option<u8>)>> {
    prop::collection::vec((0..PATHS.len(), prop::option::weighted(0.85, 0u8..4)), 0..6)
}

fn completed_tasks(outputs: &[Vec<(usize, Option<u8>)>]) -> Vec<AgentTask> {
    outputs
        .iter()
        .enumerate()
        .map(|(idx, writes)| {
            let partition = WorkPartition::new(format!("part-{idx}"), format!("partition {idx}"))
                .with_priority(u32::try_from(idx).unwrap());
            let mut task = AgentTask::new(partition);
            task.mark_running();
            for (path, variant) in writes {
                task.output.push(match variant {
                    Some(v) => FileChange::write(PATHS[*path], format!("export const v = {v};\n")),
                    None => FileChange::delete(PATHS[*path]),
                });
            }
            task.mark_completed(None);
            task
        })
        .collect()
}

fn baseline() -> WorkspaceSnapshot {
    let mut files = BTreeMap::new();
    files.insert("src/app.ts".to_string(), "export const v = 0;\n".to_string());
    WorkspaceSnapshot::new(files)
}

proptest! {
    #[test]
    fn prop_merge_is_deterministic(
        outputs in prop::collection::vec(agent_output(), 1..5),
        prefer_priority in any::<bool>(),
    ) {
        let policy = if prefer_priority { ConflictPolicy::PreferPriority } else { ConflictPolicy::Fail };
        let resolver = MergeResolver::new(policy);
        let tasks = completed_tasks(&outputs);

        let first = resolver.plan(&baseline(), &tasks);
        let second = resolver.plan(&baseline(), &tasks);
        prop_assert_eq!(&first, &second);

        // Input order does not matter once priorities are distinct.
        let mut reversed = tasks.clone();
        reversed.reverse();
        prop_assert_eq!(&first, &resolver.plan(&baseline(), &reversed));
    }

    #[test]
    fn prop_merge_report_accounts_for_every_path(
        outputs in prop::collection::vec(agent_output(), 1..5),
    ) {
        let tasks = completed_tasks(&outputs);
        let plan = MergeResolver::new(ConflictPolicy::Fail).plan(&baseline(), &tasks);

        let touched: std::collections::BTreeSet<&str> = outputs
            .iter()
            .flatten()
            .map(|(path, _)| PATHS[*path])
            .collect();
        prop_assert_eq!(plan.writes.len(), touched.len());
        prop_assert_eq!(
            plan.report.merged_paths.len() + plan.report.deleted_paths.len(),
            touched.len()
        );
        prop_assert_eq!(plan.report.success, plan.report.conflicts.iter().all(|c| c.resolved));
        for conflict in &plan.report.conflicts {
            prop_assert!(conflict.conflicting_agents.len() >= 2);
        }
    }

    #[test]
    fn prop_published_entries_are_visible_to_later_queries(
        ops in prop::collection::vec((0usize..4, any::<bool>()), 1..40),
    ) {
        let bus = ContextBus::new(Uuid::new_v4());
        let agents: Vec<String> = (0..4).map(|i| format!("agent-{i}")).collect();
        for agent in &agents {
            bus.register_agent(agent, &format!("work for {agent}"));
        }

        let mut published: Vec<(String, u64)> = Vec::new();
        for (agent_idx, is_publish) in ops {
            let agent = &agents[agent_idx];
            if is_publish {
                let entry = bus.publish(agent, Discovery::new(DiscoveryKind::Note, "found something"));
                published.push((agent.clone(), entry.sequence));
            } else {
                let seen: Vec<u64> = bus.query(agent, None, true).iter().map(|e| e.sequence).collect();
                let expected: Vec<u64> = published
                    .iter()
                    .filter(|(source, _)| source != agent)
                    .map(|(_, seq)| *seq)
                    .collect();
                prop_assert_eq!(seen, expected);
            }
        }
        prop_assert_eq!(bus.len(), published.len());
    }
}

#[test]
fn concurrent_publishers_see_their_own_entries() {
    let bus = ContextBus::new(Uuid::new_v4());
    let agents: Vec<String> = (0..8).map(|i| format!("agent-{i}")).collect();
    for agent in &agents {
        bus.register_agent(agent, "parallel work");
    }

    std::thread::scope(|scope| {
        for agent in &agents {
            let bus = &bus;
            scope.spawn(move || {
                for n in 0..25 {
                    let entry = bus.publish(agent, Discovery::new(DiscoveryKind::Note, format!("{agent} #{n}")));
                    let visible = bus.query("observer", None, false);
                    assert!(visible.iter().any(|e| e.sequence == entry.sequence));
                }
            });
        }
    });

    let all = bus.query("observer", None, false);
    assert_eq!(all.len(), 8 * 25);
    let sequences: Vec<u64> = all.iter().map(|e| e.sequence).collect();
    let mut sorted = sequences.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sequences, sorted);
}
