// src/engine/core.rs

//! Pure scheduler core.
//!
//! Consumes [`MissionEvent`]s and produces:
//! - an updated [`SchedulerState`]
//! - a list of [`CoreCommand`]s describing what the IO shell should publish
//!
//! The async shell (`engine::runtime::Scheduler`) reads the events stream and
//! performs the appends. The core has no broker, no Tokio types and no IO, so
//! the whole enqueue policy is unit tested with plain events.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::bus::{EventType, MissionEvent, RunnableRecord};
use crate::dag::{MissionDag, TaskId};
use crate::engine::report::MissionReport;
use crate::engine::state::{Applied, SchedulerState};
use crate::types::{TaskKind, TaskStatus};

/// Every enqueue is a first attempt; failed tasks are not re-enqueued.
pub const FIRST_ATTEMPT: u32 = 1;

/// One enqueue: the runnable record to publish first, then the
/// `TASK_ENQUEUED` event recording it. The core has already folded the event.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub record: RunnableRecord,
    pub event: MissionEvent,
}

/// Command produced by the pure core, executed by the IO shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    Enqueue(Dispatch),
}

/// Decision returned by the core after handling one input.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// `false` once the mission is settled (nothing READY or RUNNING).
    pub keep_running: bool,
    /// Set when the event was dropped by the fold.
    pub applied: Applied,
}

#[derive(Debug, Clone)]
pub struct SchedulerCore {
    dag: MissionDag,
    state: SchedulerState,
    emitter_id: String,
}

impl SchedulerCore {
    pub fn new(dag: MissionDag, emitter_id: impl Into<String>) -> Self {
        let state = SchedulerState::new(&dag);
        Self::with_state(dag, state, emitter_id)
    }

    /// Start from a state rebuilt elsewhere, e.g. by [`crate::engine::replay`].
    pub fn with_state(dag: MissionDag, state: SchedulerState, emitter_id: impl Into<String>) -> Self {
        Self {
            dag,
            state,
            emitter_id: emitter_id.into(),
        }
    }

    pub fn dag(&self) -> &MissionDag {
        &self.dag
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn emitter_id(&self) -> &str {
        &self.emitter_id
    }

    pub fn is_settled(&self) -> bool {
        self.state.is_settled()
    }

    /// Enqueue everything currently READY. Used at start and on resume.
    pub fn start(&mut self) -> CoreStep {
        let commands = self.drain_ready();
        CoreStep {
            commands,
            keep_running: !self.is_settled(),
            applied: Applied::default(),
        }
    }

    /// Fold an event without enqueueing anything (log replay).
    pub fn observe(&mut self, event: &MissionEvent) -> Applied {
        self.state.apply(&self.dag, event)
    }

    /// Fold one event from the log and enqueue whatever it unlocked.
    pub fn step(&mut self, event: &MissionEvent) -> CoreStep {
        let applied = self.state.apply(&self.dag, event);

        if let Some(reason) = &applied.ignored {
            debug!(
                task_id = %event.task_id,
                event_type = %event.event_type,
                emitter = %event.emitter_id,
                %reason,
                "ignoring event"
            );
        } else if event.event_type == EventType::TaskFailed {
            let blocked = self.dag.dependents_of(event.task_id.as_str()).len();
            info!(
                task_id = %event.task_id,
                blocked_dependents = blocked,
                "task failed; dependents stay blocked"
            );
        }

        let commands = if applied.newly_ready.is_empty() {
            Vec::new()
        } else {
            self.drain_ready()
        };

        CoreStep {
            commands,
            keep_running: !self.is_settled(),
            applied,
        }
    }

    pub fn report(&self) -> MissionReport {
        MissionReport::from_state(&self.dag, &self.state)
    }

    /// Turn every READY task into a dispatch and fold its `TASK_ENQUEUED`
    /// locally so it is never dispatched twice.
    fn drain_ready(&mut self) -> Vec<CoreCommand> {
        let ready = self.state.ready_tasks(&self.dag);
        let mut commands = Vec::with_capacity(ready.len());

        for id in ready {
            let Some(record) = self.runnable_record(&id) else {
                continue;
            };
            let event = MissionEvent::new(
                self.dag.mission_id(),
                id.clone(),
                EventType::TaskEnqueued,
                self.emitter_id.clone(),
                json!({ "attempt": record.attempt, "task_key": record.task_key }),
            );

            self.state.apply(&self.dag, &event);
            debug_assert_eq!(self.state.status_of(id.as_str()), Some(TaskStatus::Running));

            commands.push(CoreCommand::Enqueue(Dispatch { record, event }));
        }

        commands
    }

    fn runnable_record(&self, id: &TaskId) -> Option<RunnableRecord> {
        let def = self.dag.task(id.as_str())?;

        let upstream = match def.kind {
            TaskKind::Reduce => def
                .parents
                .iter()
                .map(|parent| {
                    let output = self
                        .state
                        .output_of(parent.as_str())
                        .cloned()
                        .unwrap_or(Value::Null);
                    (parent.to_string(), output)
                })
                .collect(),
            TaskKind::Unit => BTreeMap::new(),
        };

        Some(RunnableRecord {
            mission_id: def.mission_id.clone(),
            task_id: def.id.clone(),
            task_type: def.kind.as_str().to_string(),
            task_key: def.key.clone(),
            attempt: FIRST_ATTEMPT,
            inputs: def.inputs.clone(),
            upstream,
        })
    }
}
