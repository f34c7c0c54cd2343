// src/dag/graph.rs

use std::collections::BTreeMap;

use crate::dag::task::{TaskDefinition, TaskId};

/// Validated, immutable mission DAG plus the indices the scheduler needs.
///
/// Only [`crate::dag::build_dag`] constructs this, so every instance is known
/// to be acyclic with all edges pointing at existing tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionDag {
    mission_id: String,
    tasks: BTreeMap<TaskId, TaskDefinition>,
    /// Initial `deps_remaining`: equals indegree for every task.
    deps_remaining: BTreeMap<TaskId, usize>,
    /// Tasks with no parents, in plan order.
    initial_ready: Vec<TaskId>,
    /// Kahn order (parents before children; ties in plan order).
    topo_order: Vec<TaskId>,
}

impl MissionDag {
    pub(crate) fn new(
        mission_id: String,
        tasks: BTreeMap<TaskId, TaskDefinition>,
        initial_ready: Vec<TaskId>,
        topo_order: Vec<TaskId>,
    ) -> Self {
        let deps_remaining = tasks
            .iter()
            .map(|(id, def)| (id.clone(), def.indegree()))
            .collect();

        Self {
            mission_id,
            tasks,
            deps_remaining,
            initial_ready,
            topo_order,
        }
    }

    pub fn mission_id(&self) -> &str {
        &self.mission_id
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, id: &str) -> Option<&TaskDefinition> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// All task definitions, ordered by id.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.tasks.values()
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.tasks.keys()
    }

    /// Immediate parents (the task's `depends_on`).
    pub fn parents_of(&self, id: &str) -> &[TaskId] {
        self.tasks
            .get(id)
            .map(|t| t.parents.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents (tasks that list this one in `depends_on`).
    pub fn dependents_of(&self, id: &str) -> &[TaskId] {
        self.tasks
            .get(id)
            .map(|t| t.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn indegree(&self, id: &str) -> Option<usize> {
        self.tasks.get(id).map(TaskDefinition::indegree)
    }

    /// Initial dependency counters, one per task.
    pub fn deps_remaining(&self) -> &BTreeMap<TaskId, usize> {
        &self.deps_remaining
    }

    pub fn initial_ready(&self) -> &[TaskId] {
        &self.initial_ready
    }

    pub fn topo_order(&self) -> &[TaskId] {
        &self.topo_order
    }

    /// Transitive ancestors of `id` (excluding `id` itself).
    pub fn ancestors_of(&self, id: &str) -> Vec<TaskId> {
        let mut stack: Vec<&TaskId> = self.parents_of(id).iter().collect();
        let mut seen: Vec<TaskId> = Vec::new();

        while let Some(parent) = stack.pop() {
            if seen.contains(parent) {
                continue;
            }
            seen.push(parent.clone());
            stack.extend(self.parents_of(parent.as_str()));
        }

        seen.sort();
        seen
    }
}
