// src/exec/worker.rs

//! Worker: consumes a mission's runnable stream through the shared consumer
//! group and runs records on a fixed number of execution slots.
//!
//! Shape of one worker:
//!
//! ```text
//! read_group ──> bounded FIFO (capacity = concurrency) ──> N slots ──> executor
//! ```
//!
//! The reader stops pulling from the broker while the FIFO is full, so a
//! worker never holds much more than `2 * concurrency` undelivered work.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::{EventBus, StreamEntry, StreamNames};
use crate::config::MissionConfig;
use crate::errors::{MissionError, Result};
use crate::exec::executor::TaskExecutor;
use crate::exec::task_runner::{run_entry, SlotContext, SlotCounters};

/// Tuning knobs of a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Number of execution slots (max in-flight executions).
    pub concurrency: usize,
    /// Wall-clock bound per execution.
    pub task_timeout: Duration,
    /// How long one broker read waits for new entries.
    pub block: Duration,
    /// Max entries per broker read.
    pub batch_size: usize,
    /// Take over entries other consumers left pending this long.
    pub claim_idle_after: Option<Duration>,
}

impl WorkerOptions {
    pub fn from_config(cfg: &MissionConfig) -> Self {
        Self {
            concurrency: cfg.worker.concurrency,
            task_timeout: cfg.worker.task_timeout,
            block: cfg.reader.block,
            batch_size: cfg.reader.batch_size,
            claim_idle_after: cfg.worker.claim_idle_after,
        }
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from_config(&MissionConfig::default())
    }
}

/// Counters reported when a worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Records that reached the executor (or failed on an unknown kind).
    pub executed: u64,
    pub succeeded: u64,
    /// Includes timeouts.
    pub failed: u64,
    pub timed_out: u64,
    /// Malformed entries acknowledged without execution.
    pub discarded: u64,
}

impl WorkerStats {
    fn snapshot(counters: &SlotCounters) -> Self {
        Self {
            executed: counters.executed.load(Ordering::Relaxed),
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            timed_out: counters.timed_out.load(Ordering::Relaxed),
            discarded: counters.discarded.load(Ordering::Relaxed),
        }
    }
}

/// One consumer of a mission's runnable stream.
pub struct Worker {
    id: String,
    bus: Arc<dyn EventBus>,
    executor: Arc<dyn TaskExecutor>,
    streams: StreamNames,
    runnable_stream: String,
    options: WorkerOptions,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("runnable_stream", &self.runnable_stream)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Worker {
    pub fn new(
        bus: Arc<dyn EventBus>,
        executor: Arc<dyn TaskExecutor>,
        streams: StreamNames,
        mission_id: &str,
        options: WorkerOptions,
    ) -> Self {
        let runnable_stream = streams.runnable(mission_id);
        Self {
            id: format!("worker-{}", Uuid::new_v4().simple()),
            bus,
            executor,
            streams,
            runnable_stream,
            options,
        }
    }

    /// Use a fixed consumer name, e.g. to restart a worker under the same
    /// identity and recover the entries it left pending.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run the worker on a background task.
    pub fn spawn(self) -> WorkerHandle {
        let id = self.id.clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(self.run(shutdown_rx));
        WorkerHandle {
            id,
            shutdown: Some(shutdown_tx),
            join,
        }
    }

    /// Consume until `shutdown` fires (or its sender is dropped).
    ///
    /// On shutdown the reader stops, queued records are still run, and the
    /// call returns once every slot is idle. A broker error, whether hit by
    /// the reader or by a slot, ends the reader with that error; records
    /// already handed to slots are still finished. The entry a slot failed
    /// on stays pending for the next run of this consumer (or for
    /// `claim_idle`).
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) -> Result<WorkerStats> {
        let Worker {
            id,
            bus,
            executor,
            streams,
            runnable_stream,
            options,
        } = self;

        bus.ensure_group(&runnable_stream, streams.group()).await?;

        let concurrency = options.concurrency.max(1);
        let batch_size = options.batch_size.max(1);

        let ctx = Arc::new(SlotContext {
            bus: Arc::clone(&bus),
            executor,
            streams,
            runnable_stream,
            worker_id: id.clone(),
            task_timeout: options.task_timeout,
            counters: SlotCounters::default(),
        });

        info!(
            worker = %id,
            stream = %ctx.runnable_stream,
            group = %ctx.streams.group(),
            concurrency,
            "worker started"
        );

        let (tx, rx) = mpsc::channel::<StreamEntry>(concurrency);
        let queue = Arc::new(Mutex::new(rx));
        let (failure_tx, mut failure_rx) = mpsc::channel::<MissionError>(concurrency);

        let mut slots = JoinSet::new();
        for slot in 0..concurrency {
            slots.spawn(run_slot(
                slot,
                Arc::clone(&ctx),
                Arc::clone(&queue),
                failure_tx.clone(),
            ));
        }
        drop(failure_tx);

        let mut outcome = feed_slots(
            &ctx,
            &options,
            batch_size,
            &tx,
            &mut shutdown,
            &mut failure_rx,
        )
        .await;

        // Closing the queue lets slots drain what is left and exit.
        drop(tx);
        while let Some(joined) = slots.join_next().await {
            if let Err(err) = joined {
                error!(worker = %id, error = %err, "execution slot ended abnormally");
            }
        }

        // A slot may have failed while the reader was already shutting down.
        if outcome.is_ok() {
            if let Ok(err) = failure_rx.try_recv() {
                outcome = Err(err);
            }
        }

        let stats = WorkerStats::snapshot(&ctx.counters);
        match outcome {
            Ok(()) => {
                info!(worker = %id, ?stats, "worker stopped");
                Ok(stats)
            }
            Err(err) => {
                error!(worker = %id, error = %err, ?stats, "worker stopped on broker error");
                Err(err)
            }
        }
    }
}

/// Reader side: recover this consumer's own pending entries, then pull new
/// ones until shutdown or until a slot reports a broker error.
async fn feed_slots(
    ctx: &SlotContext,
    options: &WorkerOptions,
    batch_size: usize,
    tx: &mpsc::Sender<StreamEntry>,
    shutdown: &mut oneshot::Receiver<()>,
    slot_failures: &mut mpsc::Receiver<MissionError>,
) -> Result<()> {
    let recovered = ctx
        .bus
        .pending(&ctx.runnable_stream, ctx.streams.group(), &ctx.worker_id, usize::MAX)
        .await?;
    if !recovered.is_empty() {
        warn!(
            worker = %ctx.worker_id,
            count = recovered.len(),
            "re-running entries left pending by a previous run of this worker"
        );
    }
    if !enqueue(tx, recovered).await {
        return Ok(());
    }

    loop {
        let room = tx.capacity().clamp(1, batch_size);

        tokio::select! {
            biased;

            _ = &mut *shutdown => {
                debug!(worker = %ctx.worker_id, "shutdown requested");
                return Ok(());
            }

            Some(err) = slot_failures.recv() => {
                return Err(err);
            }

            batch = next_batch(ctx, options, room) => {
                if !enqueue(tx, batch?).await {
                    return Ok(());
                }
            }
        }
    }
}

async fn next_batch(
    ctx: &SlotContext,
    options: &WorkerOptions,
    max_count: usize,
) -> Result<Vec<StreamEntry>> {
    if let Some(min_idle) = options.claim_idle_after {
        let claimed = ctx
            .bus
            .claim_idle(
                &ctx.runnable_stream,
                ctx.streams.group(),
                &ctx.worker_id,
                min_idle,
                max_count,
            )
            .await?;
        if !claimed.is_empty() {
            return Ok(claimed);
        }
    }

    ctx.bus
        .read_group(
            &ctx.runnable_stream,
            ctx.streams.group(),
            &ctx.worker_id,
            options.block,
            max_count,
        )
        .await
}

/// Push entries into the FIFO, waiting for room. Returns `false` once every
/// slot is gone.
async fn enqueue(tx: &mpsc::Sender<StreamEntry>, entries: Vec<StreamEntry>) -> bool {
    for entry in entries {
        if tx.send(entry).await.is_err() {
            return false;
        }
    }
    true
}

async fn run_slot(
    slot: usize,
    ctx: Arc<SlotContext>,
    queue: Arc<Mutex<mpsc::Receiver<StreamEntry>>>,
    failures: mpsc::Sender<MissionError>,
) {
    loop {
        let next = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        let Some(entry) = next else {
            break;
        };

        let entry_id = entry.id;
        if let Err(err) = run_entry(&ctx, entry).await {
            error!(
                worker = %ctx.worker_id,
                slot,
                entry_id = %entry_id,
                error = %err,
                "broker error while running entry; left pending for redelivery"
            );
            // The reader stops the worker on the first report.
            let _ = failures.try_send(err);
            break;
        }
    }
    debug!(worker = %ctx.worker_id, slot, "execution slot finished");
}

/// Handle to a worker running on a background task.
#[derive(Debug)]
pub struct WorkerHandle {
    id: String,
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<Result<WorkerStats>>,
}

impl WorkerHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ask the worker to stop and wait for its in-flight records to finish.
    pub async fn stop(mut self) -> Result<WorkerStats> {
        if let Some(shutdown) = self.shutdown.take() {
            // The worker may already have exited on its own.
            let _ = shutdown.send(());
        }
        self.join
            .await
            .map_err(|e| MissionError::Other(anyhow::anyhow!("worker task failed: {e}")))?
    }

    /// Kill the worker without draining. Entries it had read but not yet
    /// acknowledged stay pending in the consumer group.
    pub fn abort(self) {
        self.join.abort();
    }
}
