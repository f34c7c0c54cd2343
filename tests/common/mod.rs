#![allow(dead_code)]

pub use missiondag_test_utils::builders::{fast_config, task_id, PlanBuilder, TaskBuilder};
pub use missiondag_test_utils::fake_executor::{Behaviour, ScriptedExecutor};
pub use missiondag_test_utils::{eventually, init_tracing, with_timeout};

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{json, Value};

use missiondag::bus::{
    BusFuture, EntryId, EventBus, EventType, Fields, MemoryBus, MissionEvent, StreamEntry,
};
use missiondag::dag::{MissionDag, TaskId};
use missiondag::errors::MissionError;
use missiondag::types::TaskKind;

pub const WORKER: &str = "worker-test";

/// Event as a worker would emit it for `task`.
pub fn event(dag: &MissionDag, task: &str, event_type: EventType, data: Value) -> MissionEvent {
    MissionEvent::new(
        dag.mission_id(),
        TaskId::from(task),
        event_type,
        WORKER,
        data,
    )
}

pub fn succeeded(dag: &MissionDag, task: &str, output: Value) -> MissionEvent {
    event(dag, task, EventType::TaskSucceeded, json!({ "output": output }))
}

pub fn failed(dag: &MissionDag, task: &str) -> MissionEvent {
    event(
        dag,
        task,
        EventType::TaskFailed,
        json!({ "reason": "execution", "error_type": "Test", "message": "boom", "trace": [] }),
    )
}

pub fn started(dag: &MissionDag, task: &str) -> MissionEvent {
    event(dag, task, EventType::TaskStarted, json!({ "attempt": 1 }))
}

/// Single-unit task in stage "s", sub-stage "x".
pub fn unit(slice: u32) -> String {
    task_id("s", "x", TaskKind::Unit, slice)
}

/// A -> B -> C, keys "a", "b", "c".
pub fn chain_plan(mission_id: &str) -> missiondag::plan::MissionPlan {
    PlanBuilder::new(mission_id)
        .with_task("s", "x", TaskBuilder::unit(0).key("a").build())
        .with_task("s", "x", TaskBuilder::unit(1).key("b").after(&unit(0)).build())
        .with_task("s", "x", TaskBuilder::unit(2).key("c").after(&unit(1)).build())
        .build()
}

/// R -> {C1, C2}, keys "r", "c1", "c2".
pub fn fan_out_plan(mission_id: &str) -> missiondag::plan::MissionPlan {
    PlanBuilder::new(mission_id)
        .with_task("s", "x", TaskBuilder::unit(0).key("r").build())
        .with_task("s", "x", TaskBuilder::unit(1).key("c1").after(&unit(0)).build())
        .with_task("s", "x", TaskBuilder::unit(2).key("c2").after(&unit(0)).build())
        .build()
}

/// Memory broker whose first append of one event type fails; every other
/// call goes straight through.
pub struct FlakyBus {
    inner: MemoryBus,
    fail_event: EventType,
    tripped: AtomicBool,
}

impl FlakyBus {
    pub fn failing_first(fail_event: EventType) -> Self {
        Self {
            inner: MemoryBus::new(),
            fail_event,
            tripped: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &MemoryBus {
        &self.inner
    }

    /// Whether the injected failure already happened.
    pub fn tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

impl EventBus for FlakyBus {
    fn append(&self, stream: &str, fields: Fields) -> BusFuture<'_, EntryId> {
        let targeted =
            fields.get("event_type").map(String::as_str) == Some(self.fail_event.as_str());
        if targeted && !self.tripped.swap(true, Ordering::SeqCst) {
            return Box::pin(async {
                Err(MissionError::BrokerUnavailable(
                    "connection reset during append".to_string(),
                ))
            });
        }
        self.inner.append(stream, fields)
    }

    fn read(
        &self,
        stream: &str,
        after: EntryId,
        block: Duration,
        max_count: usize,
    ) -> BusFuture<'_, Vec<StreamEntry>> {
        self.inner.read(stream, after, block, max_count)
    }

    fn last_id(&self, stream: &str) -> BusFuture<'_, EntryId> {
        self.inner.last_id(stream)
    }

    fn ensure_group(&self, stream: &str, group: &str) -> BusFuture<'_, ()> {
        self.inner.ensure_group(stream, group)
    }

    fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
        max_count: usize,
    ) -> BusFuture<'_, Vec<StreamEntry>> {
        self.inner.read_group(stream, group, consumer, block, max_count)
    }

    fn pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
    ) -> BusFuture<'_, Vec<StreamEntry>> {
        self.inner.pending(stream, group, consumer, max_count)
    }

    fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        max_count: usize,
    ) -> BusFuture<'_, Vec<StreamEntry>> {
        self.inner
            .claim_idle(stream, group, consumer, min_idle, max_count)
    }

    fn ack(&self, stream: &str, group: &str, id: EntryId) -> BusFuture<'_, bool> {
        self.inner.ack(stream, group, id)
    }
}
