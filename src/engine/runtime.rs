// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::{EntryId, EventBus, MissionEvent, StreamNames};
use crate::config::MissionConfig;
use crate::dag::MissionDag;
use crate::errors::Result;

use super::core::{CoreCommand, Dispatch, SchedulerCore};
use super::report::MissionReport;

/// Tuning knobs of the scheduler's tail loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// How long one events-stream read waits.
    pub block: Duration,
    pub batch_size: usize,
    /// Interval between status summaries in the log.
    pub status_interval: Duration,
}

impl SchedulerOptions {
    pub fn from_config(cfg: &MissionConfig) -> Self {
        Self {
            block: cfg.reader.block,
            batch_size: cfg.reader.batch_size,
            status_interval: cfg.scheduler.status_interval,
        }
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_config(&MissionConfig::default())
    }
}

/// Drives a mission to completion over the event bus.
///
/// Pure IO shell around [`SchedulerCore`]: it tails the mission's events
/// stream, feeds each event into the core, and publishes the enqueues the
/// core asks for.
pub struct Scheduler {
    core: SchedulerCore,
    bus: Arc<dyn EventBus>,
    streams: StreamNames,
    runnable_stream: String,
    events_stream: String,
    options: SchedulerOptions,
    cursor: EntryId,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("core", &self.core)
            .field("events_stream", &self.events_stream)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(
        dag: MissionDag,
        bus: Arc<dyn EventBus>,
        streams: StreamNames,
        options: SchedulerOptions,
    ) -> Self {
        let runnable_stream = streams.runnable(dag.mission_id());
        let events_stream = streams.events(dag.mission_id());
        let emitter_id = format!("scheduler-{}", Uuid::new_v4().simple());

        Self {
            core: SchedulerCore::new(dag, emitter_id),
            bus,
            streams,
            runnable_stream,
            events_stream,
            options,
            cursor: EntryId::START,
        }
    }

    pub fn from_config(dag: MissionDag, bus: Arc<dyn EventBus>, cfg: &MissionConfig) -> Self {
        Self::new(
            dag,
            bus,
            StreamNames::from_config(&cfg.streams),
            SchedulerOptions::from_config(cfg),
        )
    }

    pub fn emitter_id(&self) -> &str {
        self.core.emitter_id()
    }

    /// Run a fresh mission: enqueue the roots, then fold events until no
    /// task is READY or RUNNING.
    ///
    /// Tailing starts at the end of the events stream as it was before the
    /// first enqueue.
    pub async fn run(mut self) -> Result<MissionReport> {
        self.prepare().await?;
        self.cursor = self.bus.last_id(&self.events_stream).await?;

        info!(
            mission_id = %self.core.dag().mission_id(),
            scheduler = %self.emitter_id(),
            tasks = self.core.dag().len(),
            "scheduler started"
        );

        self.drive().await
    }

    /// Crash-recovery start: rebuild state by folding the whole events
    /// stream, enqueue every READY task, then tail from where the replay
    /// stopped.
    ///
    /// A task whose runnable record was published just before the crash may
    /// be enqueued a second time.
    pub async fn resume(mut self) -> Result<MissionReport> {
        self.prepare().await?;

        let mut replayed = 0usize;
        loop {
            let entries = self
                .bus
                .read(
                    &self.events_stream,
                    self.cursor,
                    Duration::ZERO,
                    self.options.batch_size.max(1),
                )
                .await?;
            if entries.is_empty() {
                break;
            }

            for entry in entries {
                self.cursor = entry.id;
                if let Some(event) = self.decode(&entry.fields, entry.id) {
                    self.core.observe(&event);
                    replayed += 1;
                }
            }
        }

        info!(
            mission_id = %self.core.dag().mission_id(),
            scheduler = %self.emitter_id(),
            replayed,
            cursor = %self.cursor,
            summary = %self.core.state().summary(),
            "scheduler resumed from event log"
        );

        self.drive().await
    }

    async fn prepare(&self) -> Result<()> {
        self.bus
            .ensure_group(&self.runnable_stream, self.streams.group())
            .await
    }

    async fn drive(&mut self) -> Result<MissionReport> {
        let step = self.core.start();
        self.execute_commands(step.commands).await?;

        let mut last_summary = Instant::now();

        while !self.core.is_settled() {
            let entries = self
                .bus
                .read(
                    &self.events_stream,
                    self.cursor,
                    self.options.block,
                    self.options.batch_size.max(1),
                )
                .await?;

            for entry in entries {
                self.cursor = entry.id;
                let Some(event) = self.decode(&entry.fields, entry.id) else {
                    continue;
                };

                // Already folded when it was dispatched.
                if event.emitter_id == self.core.emitter_id() {
                    continue;
                }

                debug!(
                    task_id = %event.task_id,
                    event_type = %event.event_type,
                    emitter = %event.emitter_id,
                    "scheduler received event"
                );

                let step = self.core.step(&event);
                self.execute_commands(step.commands).await?;
            }

            if last_summary.elapsed() >= self.options.status_interval {
                info!(
                    mission_id = %self.core.dag().mission_id(),
                    summary = %self.core.state().summary(),
                    "mission status"
                );
                last_summary = Instant::now();
            }
        }

        let report = self.core.report();
        info!(
            mission_id = %report.mission_id,
            succeeded = report.succeeded().len(),
            failed = report.failed().len(),
            blocked = report.blocked().len(),
            "mission settled"
        );
        Ok(report)
    }

    fn decode(&self, fields: &crate::bus::Fields, id: EntryId) -> Option<MissionEvent> {
        match MissionEvent::from_fields(fields) {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(
                    stream = %self.events_stream,
                    entry_id = %id,
                    error = %err,
                    "skipping malformed event entry"
                );
                None
            }
        }
    }

    async fn execute_commands(&self, commands: Vec<CoreCommand>) -> Result<()> {
        for command in commands {
            match command {
                CoreCommand::Enqueue(dispatch) => self.enqueue(dispatch).await?,
            }
        }
        Ok(())
    }

    /// Runnable record first, then the `TASK_ENQUEUED` event: a crash in
    /// between can duplicate the task on resume but never lose it.
    async fn enqueue(&self, dispatch: Dispatch) -> Result<()> {
        let Dispatch { record, event } = dispatch;

        let entry_id = self
            .bus
            .append(&self.runnable_stream, record.to_fields()?)
            .await?;
        self.bus
            .append(&self.events_stream, event.to_fields()?)
            .await?;

        info!(
            task_id = %record.task_id,
            task_key = %record.task_key,
            kind = %record.task_type,
            entry_id = %entry_id,
            "enqueued task"
        );
        Ok(())
    }
}
