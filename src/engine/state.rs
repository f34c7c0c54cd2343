// src/engine/state.rs

//! Disposable scheduler state and the pure event fold.
//!
//! [`SchedulerState`] holds nothing that cannot be rebuilt: construct it from
//! a [`MissionDag`], then [`SchedulerState::apply`] every event of the
//! mission's log in order. [`replay`] does exactly that.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::bus::{EventType, MissionEvent};
use crate::dag::{MissionDag, TaskId};
use crate::types::TaskStatus;

/// Running totals over every event offered to [`SchedulerState::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerCounters {
    /// Events that changed state.
    pub applied: u64,
    /// Events dropped by the fold (foreign, unknown, stale, out of order).
    pub ignored: u64,
    pub enqueued: u64,
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Why an event did not change state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    ForeignMission(String),
    UnknownTask,
    /// The task already reached a terminal status.
    AlreadyTerminal(TaskStatus),
    /// The event is not a valid transition from the current status.
    InvalidTransition { from: TaskStatus, event: EventType },
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::ForeignMission(other) => write!(f, "event for mission '{other}'"),
            IgnoreReason::UnknownTask => f.write_str("unknown task id"),
            IgnoreReason::AlreadyTerminal(status) => write!(f, "task already {status}"),
            IgnoreReason::InvalidTransition { from, event } => {
                write!(f, "{event} not accepted while {from}")
            }
        }
    }
}

/// Result of folding one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// Dependents that became READY because of this event.
    pub newly_ready: Vec<TaskId>,
    /// Set when the event was dropped.
    pub ignored: Option<IgnoreReason>,
}

impl Applied {
    fn ignored(reason: IgnoreReason) -> Self {
        Self {
            newly_ready: Vec::new(),
            ignored: Some(reason),
        }
    }
}

/// Number of tasks in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub pending: usize,
    pub ready: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl StatusSummary {
    pub fn from_statuses(statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        let mut summary = StatusSummary::default();
        for status in statuses {
            match status {
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::Ready => summary.ready += 1,
                TaskStatus::Running => summary.running += 1,
                TaskStatus::Succeeded => summary.succeeded += 1,
                TaskStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pending={} ready={} running={} succeeded={} failed={}",
            self.pending, self.ready, self.running, self.succeeded, self.failed
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerState {
    mission_id: String,
    status_by_task_id: BTreeMap<TaskId, TaskStatus>,
    deps_remaining: BTreeMap<TaskId, usize>,
    outputs_by_task_id: BTreeMap<TaskId, Value>,
    failures_by_task_id: BTreeMap<TaskId, Value>,
    counters: SchedulerCounters,
}

impl SchedulerState {
    /// Fresh state: tasks without parents are READY, everything else PENDING.
    pub fn new(dag: &MissionDag) -> Self {
        let deps_remaining = dag.deps_remaining().clone();
        let status_by_task_id = deps_remaining
            .iter()
            .map(|(id, remaining)| {
                let status = if *remaining == 0 {
                    TaskStatus::Ready
                } else {
                    TaskStatus::Pending
                };
                (id.clone(), status)
            })
            .collect();

        Self {
            mission_id: dag.mission_id().to_string(),
            status_by_task_id,
            deps_remaining,
            outputs_by_task_id: BTreeMap::new(),
            failures_by_task_id: BTreeMap::new(),
            counters: SchedulerCounters::default(),
        }
    }

    pub fn mission_id(&self) -> &str {
        &self.mission_id
    }

    pub fn status_of(&self, id: &str) -> Option<TaskStatus> {
        self.status_by_task_id.get(id).copied()
    }

    pub fn statuses(&self) -> &BTreeMap<TaskId, TaskStatus> {
        &self.status_by_task_id
    }

    pub fn deps_remaining(&self, id: &str) -> Option<usize> {
        self.deps_remaining.get(id).copied()
    }

    pub fn output_of(&self, id: &str) -> Option<&Value> {
        self.outputs_by_task_id.get(id)
    }

    pub fn outputs(&self) -> &BTreeMap<TaskId, Value> {
        &self.outputs_by_task_id
    }

    pub fn failure_of(&self, id: &str) -> Option<&Value> {
        self.failures_by_task_id.get(id)
    }

    pub fn counters(&self) -> SchedulerCounters {
        self.counters
    }

    /// READY tasks in topological order.
    pub fn ready_tasks(&self, dag: &MissionDag) -> Vec<TaskId> {
        dag.topo_order()
            .iter()
            .filter(|id| self.status_of(id.as_str()) == Some(TaskStatus::Ready))
            .cloned()
            .collect()
    }

    /// No task is READY or RUNNING, so no further event can unlock anything.
    pub fn is_settled(&self) -> bool {
        !self.status_by_task_id.values().any(|s| s.is_active())
    }

    pub fn summary(&self) -> StatusSummary {
        StatusSummary::from_statuses(self.status_by_task_id.values().copied())
    }

    /// Fold a single event into the state.
    ///
    /// Never fails: events that do not fit the current state are dropped and
    /// reported through [`Applied::ignored`]. Terminal statuses are final, so
    /// a redelivered `TASK_SUCCEEDED` cannot unlock a dependent twice.
    pub fn apply(&mut self, dag: &MissionDag, event: &MissionEvent) -> Applied {
        let applied = self.fold(dag, event);
        if applied.ignored.is_some() {
            self.counters.ignored += 1;
        } else {
            self.counters.applied += 1;
        }
        applied
    }

    fn fold(&mut self, dag: &MissionDag, event: &MissionEvent) -> Applied {
        if event.mission_id != self.mission_id {
            return Applied::ignored(IgnoreReason::ForeignMission(event.mission_id.clone()));
        }

        let Some(current) = self.status_of(event.task_id.as_str()) else {
            return Applied::ignored(IgnoreReason::UnknownTask);
        };

        if current.is_terminal() {
            return Applied::ignored(IgnoreReason::AlreadyTerminal(current));
        }

        let accepted = match event.event_type {
            EventType::TaskEnqueued => current == TaskStatus::Ready,
            EventType::TaskStarted | EventType::TaskSucceeded | EventType::TaskFailed => {
                current.is_active()
            }
        };
        if !accepted {
            return Applied::ignored(IgnoreReason::InvalidTransition {
                from: current,
                event: event.event_type,
            });
        }

        let task_id = &event.task_id;
        match event.event_type {
            EventType::TaskEnqueued => {
                self.set_status(task_id, TaskStatus::Running);
                self.counters.enqueued += 1;
                Applied::default()
            }
            EventType::TaskStarted => {
                self.set_status(task_id, TaskStatus::Running);
                self.counters.started += 1;
                Applied::default()
            }
            EventType::TaskSucceeded => {
                self.set_status(task_id, TaskStatus::Succeeded);
                self.counters.succeeded += 1;
                let output = event.data.get("output").cloned().unwrap_or(Value::Null);
                self.outputs_by_task_id.insert(task_id.clone(), output);
                Applied {
                    newly_ready: self.unlock_dependents(dag, task_id),
                    ignored: None,
                }
            }
            EventType::TaskFailed => {
                self.set_status(task_id, TaskStatus::Failed);
                self.counters.failed += 1;
                self.failures_by_task_id
                    .insert(task_id.clone(), event.data.clone());
                Applied::default()
            }
        }
    }

    fn set_status(&mut self, id: &TaskId, status: TaskStatus) {
        if let Some(slot) = self.status_by_task_id.get_mut(id) {
            *slot = status;
        }
    }

    fn unlock_dependents(&mut self, dag: &MissionDag, parent: &TaskId) -> Vec<TaskId> {
        let mut newly_ready = Vec::new();

        for child in dag.dependents_of(parent.as_str()) {
            let Some(remaining) = self.deps_remaining.get_mut(child) else {
                continue;
            };
            *remaining = remaining.saturating_sub(1);

            if *remaining == 0 && self.status_of(child.as_str()) == Some(TaskStatus::Pending) {
                self.set_status(child, TaskStatus::Ready);
                newly_ready.push(child.clone());
            }
        }

        newly_ready
    }
}

/// Rebuild scheduler state by folding `events` in log order.
pub fn replay<'a, I>(dag: &MissionDag, events: I) -> SchedulerState
where
    I: IntoIterator<Item = &'a MissionEvent>,
{
    let mut state = SchedulerState::new(dag);
    for event in events {
        state.apply(dag, event);
    }
    state
}
