// src/dag/builder.rs

//! Pure plan -> DAG construction.
//!
//! No IO and no shared state: the same plan always yields the same
//! [`MissionDag`], task ids included.

use std::collections::{BTreeMap, HashMap, VecDeque};

use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::graph::MissionDag;
use crate::dag::task::{TaskDefinition, TaskId};
use crate::errors::PlanValidationError;
use crate::plan::MissionPlan;

type BuildResult<T> = std::result::Result<T, PlanValidationError>;

/// Build and validate the DAG for a mission plan.
///
/// Checks, in order:
/// - non-empty mission id and at least one task,
/// - stage / sub-stage names usable as id coordinates,
/// - unique task ids,
/// - every dependency references a known task (and not the task itself),
/// - acyclicity (Kahn's algorithm).
pub fn build_dag(plan: &MissionPlan) -> BuildResult<MissionDag> {
    if plan.mission_id.trim().is_empty() {
        return Err(PlanValidationError::EmptyMissionId);
    }
    if plan.task_count() == 0 {
        return Err(PlanValidationError::EmptyPlan(plan.mission_id.clone()));
    }

    let (order, mut tasks) = collect_definitions(plan)?;
    link_dependencies(plan, &order, &mut tasks)?;

    let topo_order = kahn_order(&order, &tasks)?;
    let initial_ready: Vec<TaskId> = order
        .iter()
        .filter(|id| tasks.get(*id).is_some_and(|t| t.parents.is_empty()))
        .cloned()
        .collect();

    debug!(
        mission_id = %plan.mission_id,
        tasks = tasks.len(),
        initial_ready = initial_ready.len(),
        "mission DAG built"
    );

    let tasks: BTreeMap<TaskId, TaskDefinition> = tasks.into_iter().collect();
    Ok(MissionDag::new(
        plan.mission_id.clone(),
        tasks,
        initial_ready,
        topo_order,
    ))
}

/// First pass: one definition per task instance, no edges yet.
///
/// Returns the ids in plan order alongside the definitions.
fn collect_definitions(
    plan: &MissionPlan,
) -> BuildResult<(Vec<TaskId>, HashMap<TaskId, TaskDefinition>)> {
    let mut order = Vec::new();
    let mut tasks = HashMap::new();

    for stage in &plan.stages {
        validate_name("stage", &stage.name)?;

        for sub in &stage.sub_stages {
            validate_name("sub-stage", &sub.name)?;

            for task in &sub.tasks {
                let id = TaskId::from_coordinates(&stage.name, &sub.name, task.kind, task.slice);
                if tasks.contains_key(&id) {
                    return Err(PlanValidationError::DuplicateTask(id));
                }

                let key = task.key.clone().unwrap_or_else(|| {
                    TaskDefinition::default_key(&stage.name, &sub.name, task.kind, task.slice)
                });

                order.push(id.clone());
                tasks.insert(
                    id.clone(),
                    TaskDefinition {
                        id,
                        mission_id: plan.mission_id.clone(),
                        kind: task.kind,
                        key,
                        stage: stage.name.clone(),
                        sub_stage: sub.name.clone(),
                        inputs: task.inputs.clone(),
                        parents: Vec::new(),
                        children: Vec::new(),
                    },
                );
            }
        }
    }

    Ok((order, tasks))
}

fn validate_name(what: &'static str, name: &str) -> BuildResult<()> {
    // Dependencies are referenced by trimmed id, so padded names could never be matched.
    if name.trim().is_empty() || name.trim() != name || name.contains('/') {
        return Err(PlanValidationError::InvalidName {
            what,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Second pass: resolve `depends_on` into parent / child edges.
fn link_dependencies(
    plan: &MissionPlan,
    order: &[TaskId],
    tasks: &mut HashMap<TaskId, TaskDefinition>,
) -> BuildResult<()> {
    let declared = plan
        .stages
        .iter()
        .flat_map(|s| s.sub_stages.iter())
        .flat_map(|ss| ss.tasks.iter());

    for (id, task) in order.iter().zip(declared) {
        let mut parents: Vec<TaskId> = Vec::new();

        for dep in &task.depends_on {
            let dep_id = TaskId::from(dep.trim());
            if dep_id == *id {
                return Err(PlanValidationError::SelfDependency(id.clone()));
            }
            if !tasks.contains_key(&dep_id) {
                return Err(PlanValidationError::UnknownDependency {
                    task: id.clone(),
                    dependency: dep.clone(),
                });
            }
            if !parents.contains(&dep_id) {
                parents.push(dep_id);
            }
        }

        for parent in &parents {
            if let Some(parent_def) = tasks.get_mut(parent) {
                parent_def.children.push(id.clone());
            }
        }
        if let Some(def) = tasks.get_mut(id) {
            def.parents = parents;
        }
    }

    Ok(())
}

/// Kahn's algorithm: repeatedly remove zero-indegree nodes.
///
/// Edge direction is parent -> child. If the queue drains before every node
/// was removed, the leftover nodes sit on (or behind) a cycle.
fn kahn_order(
    order: &[TaskId],
    tasks: &HashMap<TaskId, TaskDefinition>,
) -> BuildResult<Vec<TaskId>> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for id in order {
        graph.add_node(id.as_str());
    }
    for id in order {
        if let Some(def) = tasks.get(id) {
            for parent in &def.parents {
                graph.add_edge(parent.as_str(), id.as_str(), ());
            }
        }
    }

    let mut indegree: HashMap<&str, usize> = graph
        .nodes()
        .map(|n| (n, graph.neighbors_directed(n, Direction::Incoming).count()))
        .collect();

    let mut queue: VecDeque<&str> = order
        .iter()
        .map(TaskId::as_str)
        .filter(|n| indegree.get(n) == Some(&0))
        .collect();

    let mut topo = Vec::with_capacity(order.len());
    while let Some(node) = queue.pop_front() {
        topo.push(TaskId::from(node));

        for child in graph.neighbors_directed(node, Direction::Outgoing) {
            if let Some(count) = indegree.get_mut(child) {
                *count -= 1;
                if *count == 0 {
                    queue.push_back(child);
                }
            }
        }
    }

    if topo.len() < order.len() {
        let mut involved: Vec<TaskId> = indegree
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(node, _)| TaskId::from(node))
            .collect();
        involved.sort();
        return Err(PlanValidationError::Cycle { involved });
    }

    Ok(topo)
}
