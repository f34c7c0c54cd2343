// src/engine/report.rs

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::dag::{MissionDag, TaskId};
use crate::engine::state::{SchedulerCounters, SchedulerState, StatusSummary};
use crate::types::{TaskKind, TaskStatus};

/// Final (or current) outcome of one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub key: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub output: Option<Value>,
    /// `TASK_FAILED` payload.
    pub failure: Option<Value>,
    /// Failed ancestors keeping a PENDING task from ever running.
    pub blocked_by: Vec<TaskId>,
}

/// Per-task outcome of a mission.
///
/// A partially failed mission still reports every branch that succeeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionReport {
    pub mission_id: String,
    pub tasks: BTreeMap<TaskId, TaskReport>,
    pub counters: SchedulerCounters,
}

impl MissionReport {
    pub fn from_state(dag: &MissionDag, state: &SchedulerState) -> Self {
        let tasks = dag
            .tasks()
            .map(|def| {
                let status = state
                    .status_of(def.id.as_str())
                    .unwrap_or(TaskStatus::Pending);

                let blocked_by = if status == TaskStatus::Pending {
                    dag.ancestors_of(def.id.as_str())
                        .into_iter()
                        .filter(|a| state.status_of(a.as_str()) == Some(TaskStatus::Failed))
                        .collect()
                } else {
                    Vec::new()
                };

                let report = TaskReport {
                    id: def.id.clone(),
                    key: def.key.clone(),
                    kind: def.kind,
                    status,
                    output: state.output_of(def.id.as_str()).cloned(),
                    failure: state.failure_of(def.id.as_str()).cloned(),
                    blocked_by,
                };
                (def.id.clone(), report)
            })
            .collect();

        Self {
            mission_id: dag.mission_id().to_string(),
            tasks,
            counters: state.counters(),
        }
    }

    pub fn task(&self, id: &str) -> Option<&TaskReport> {
        self.tasks.get(id)
    }

    pub fn status_of(&self, id: &str) -> Option<TaskStatus> {
        self.tasks.get(id).map(|t| t.status)
    }

    pub fn output_of(&self, id: &str) -> Option<&Value> {
        self.tasks.get(id).and_then(|t| t.output.as_ref())
    }

    pub fn succeeded(&self) -> Vec<&TaskId> {
        self.with_status(TaskStatus::Succeeded)
    }

    pub fn failed(&self) -> Vec<&TaskId> {
        self.with_status(TaskStatus::Failed)
    }

    /// PENDING tasks that can never run because an ancestor failed.
    pub fn blocked(&self) -> Vec<&TaskId> {
        self.tasks
            .values()
            .filter(|t| !t.blocked_by.is_empty())
            .map(|t| &t.id)
            .collect()
    }

    pub fn is_fully_succeeded(&self) -> bool {
        self.tasks
            .values()
            .all(|t| t.status == TaskStatus::Succeeded)
    }

    pub fn summary(&self) -> StatusSummary {
        StatusSummary::from_statuses(self.tasks.values().map(|t| t.status))
    }

    fn with_status(&self, status: TaskStatus) -> Vec<&TaskId> {
        self.tasks
            .values()
            .filter(|t| t.status == status)
            .map(|t| &t.id)
            .collect()
    }
}
