// tests/scheduler_properties.rs

mod common;
use crate::common::{failed, started, succeeded, unit, PlanBuilder, TaskBuilder};

use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;
use serde_json::json;

use missiondag::dag::{MissionDag, TaskId};
use missiondag::engine::{CoreCommand, SchedulerCore};
use missiondag::types::TaskStatus;

// Acyclic by construction: task N may only depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = MissionDag> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..4),
            num_tasks,
        )
        .prop_map(move |raw_deps| {
            let mut builder = PlanBuilder::new("m-prop");
            for (i, potential) in raw_deps.into_iter().enumerate() {
                let mut task = TaskBuilder::unit(i as u32);
                let deps: BTreeSet<usize> = if i == 0 {
                    BTreeSet::new()
                } else {
                    potential.into_iter().map(|d| d % i).collect()
                };
                for dep in deps {
                    task = task.after(&unit(dep as u32));
                }
                builder = builder.with_task("s", "x", task.build());
            }
            builder.build_dag()
        })
    })
}

fn dispatched(commands: Vec<CoreCommand>) -> Vec<TaskId> {
    commands
        .into_iter()
        .map(|c| match c {
            CoreCommand::Enqueue(d) => d.record.task_id,
        })
        .collect()
}

proptest! {
    #[test]
    fn built_dag_indices_are_consistent(dag in dag_strategy(12)) {
        for def in dag.tasks() {
            prop_assert_eq!(dag.deps_remaining().get(&def.id).copied(), Some(def.indegree()));
            prop_assert_eq!(dag.initial_ready().contains(&def.id), def.indegree() == 0);
            for child in &def.children {
                prop_assert!(dag.parents_of(child.as_str()).contains(&def.id));
            }
        }

        // Topological order puts every parent before its children.
        let position: HashMap<&TaskId, usize> =
            dag.topo_order().iter().enumerate().map(|(i, id)| (id, i)).collect();
        prop_assert_eq!(position.len(), dag.len());
        for def in dag.tasks() {
            for parent in &def.parents {
                prop_assert!(position[parent] < position[&def.id]);
            }
        }
    }

    #[test]
    fn tasks_are_enqueued_once_and_only_after_their_parents(
        dag in dag_strategy(12),
        failing in proptest::collection::btree_set(0..12u32, 0..4),
        picks in proptest::collection::vec(any::<usize>(), 0..64),
        redeliver in any::<bool>(),
    ) {
        let mut core = SchedulerCore::new(dag.clone(), "scheduler-prop");
        let mut enqueued: HashMap<TaskId, usize> = HashMap::new();
        let mut in_flight: Vec<TaskId> = Vec::new();
        let mut picks = picks.into_iter();

        let mut accept = |ids: Vec<TaskId>,
                          core: &SchedulerCore,
                          in_flight: &mut Vec<TaskId>|
         -> Result<(), TestCaseError> {
            for id in ids {
                prop_assert_eq!(core.state().deps_remaining(id.as_str()), Some(0));
                for parent in dag.parents_of(id.as_str()) {
                    prop_assert_eq!(
                        core.state().status_of(parent.as_str()),
                        Some(TaskStatus::Succeeded)
                    );
                }
                *enqueued.entry(id.clone()).or_default() += 1;
                in_flight.push(id);
            }
            Ok(())
        };

        let start = dispatched(core.start().commands);
        accept(start, &core, &mut in_flight)?;

        while !in_flight.is_empty() {
            let idx = picks.next().unwrap_or(0) % in_flight.len();
            let id = in_flight.swap_remove(idx);
            let slice: u32 = id.as_str().rsplit('/').next().unwrap().parse().unwrap();

            core.step(&started(&dag, id.as_str()));
            let outcome = if failing.contains(&slice) {
                failed(&dag, id.as_str())
            } else {
                succeeded(&dag, id.as_str(), json!(slice))
            };

            let ids = dispatched(core.step(&outcome).commands);
            accept(ids, &core, &mut in_flight)?;

            if redeliver {
                let again = dispatched(core.step(&outcome).commands);
                prop_assert!(again.is_empty());
            }
        }

        prop_assert!(core.is_settled());
        prop_assert!(enqueued.values().all(|n| *n == 1));

        let report = core.report();
        for task in report.tasks.values() {
            let slice: u32 = task.id.as_str().rsplit('/').next().unwrap().parse().unwrap();
            match task.status {
                TaskStatus::Pending => prop_assert!(!task.blocked_by.is_empty()),
                TaskStatus::Failed => prop_assert!(failing.contains(&slice)),
                TaskStatus::Succeeded => prop_assert!(!failing.contains(&slice)),
                other => prop_assert!(false, "unexpected final status {}", other),
            }
        }
    }
}
