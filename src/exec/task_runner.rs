// src/exec/task_runner.rs

//! Execution of a single runnable record inside a worker slot.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, EventType, MissionEvent, RunnableRecord, StreamEntry, StreamNames};
use crate::errors::Result;
use crate::exec::executor::{TaskExecutor, TaskFailure, TaskInvocation};
use crate::types::TaskKind;

/// Counters shared by all slots of one worker.
#[derive(Debug, Default)]
pub(crate) struct SlotCounters {
    pub executed: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub timed_out: AtomicU64,
    pub discarded: AtomicU64,
}

/// Everything a slot needs to run records; shared by all slots of a worker.
pub(crate) struct SlotContext {
    pub bus: Arc<dyn EventBus>,
    pub executor: Arc<dyn TaskExecutor>,
    pub streams: StreamNames,
    pub runnable_stream: String,
    pub worker_id: String,
    pub task_timeout: Duration,
    pub counters: SlotCounters,
}

/// Run one runnable entry to a terminal event and acknowledge it.
///
/// - Malformed entries cannot be attributed to a task: they are logged and
///   acknowledged.
/// - Every decodable record gets `TASK_STARTED` followed by exactly one of
///   `TASK_SUCCEEDED` / `TASK_FAILED`, then an ack.
///
/// A broker error aborts the run before the ack, leaving the entry pending so
/// it is redelivered to this worker's recovery pass (or claimed by another).
pub(crate) async fn run_entry(ctx: &SlotContext, entry: StreamEntry) -> Result<()> {
    let record = match RunnableRecord::from_fields(&entry.fields) {
        Ok(record) => record,
        Err(err) => {
            warn!(
                worker = %ctx.worker_id,
                entry_id = %entry.id,
                error = %err,
                "discarding malformed runnable entry"
            );
            ctx.counters.discarded.fetch_add(1, Ordering::Relaxed);
            ack(ctx, &entry).await?;
            return Ok(());
        }
    };

    let events_stream = ctx.streams.events(&record.mission_id);

    info!(
        worker = %ctx.worker_id,
        mission_id = %record.mission_id,
        task_id = %record.task_id,
        task_key = %record.task_key,
        attempt = record.attempt,
        "starting task"
    );

    publish(
        ctx,
        &events_stream,
        &record,
        EventType::TaskStarted,
        json!({ "attempt": record.attempt, "entry_id": entry.id.to_string() }),
    )
    .await?;

    let outcome = match record.kind() {
        Ok(kind) => execute_with_timeout(ctx, kind, &record).await,
        Err(message) => Err(TaskFailure::UnknownKind {
            task_type: record.task_type.clone(),
            message,
        }),
    };

    ctx.counters.executed.fetch_add(1, Ordering::Relaxed);

    match outcome {
        Ok(output) => {
            info!(
                worker = %ctx.worker_id,
                task_id = %record.task_id,
                "task succeeded"
            );
            ctx.counters.succeeded.fetch_add(1, Ordering::Relaxed);
            publish(
                ctx,
                &events_stream,
                &record,
                EventType::TaskSucceeded,
                json!({ "output": output }),
            )
            .await?;
        }
        Err(failure) => {
            warn!(
                worker = %ctx.worker_id,
                task_id = %record.task_id,
                failure = %failure,
                "task failed"
            );
            if failure.is_timeout() {
                ctx.counters.timed_out.fetch_add(1, Ordering::Relaxed);
            }
            ctx.counters.failed.fetch_add(1, Ordering::Relaxed);
            let data = serde_json::to_value(&failure)?;
            publish(ctx, &events_stream, &record, EventType::TaskFailed, data).await?;
        }
    }

    ack(ctx, &entry).await
}

/// Invoke the executor in its own task under the wall-clock bound.
///
/// Running it as a separate task lets a timeout abort it and turns panics
/// into ordinary failures.
async fn execute_with_timeout(
    ctx: &SlotContext,
    kind: TaskKind,
    record: &RunnableRecord,
) -> std::result::Result<Value, TaskFailure> {
    let invocation = TaskInvocation {
        mission_id: record.mission_id.clone(),
        task_id: record.task_id.clone(),
        task_key: record.task_key.clone(),
        attempt: record.attempt,
        inputs: record.inputs.clone(),
        upstream: record.upstream.clone(),
    };

    let executor = Arc::clone(&ctx.executor);
    let mut handle = tokio::spawn(async move { executor.execute(kind, invocation).await });

    let finished = tokio::time::timeout(ctx.task_timeout, &mut handle).await;
    match finished {
        Ok(Ok(Ok(output))) => Ok(output),
        Ok(Ok(Err(err))) => Err(err.into()),
        Ok(Err(join_err)) => Err(join_failure(join_err)),
        Err(_elapsed) => {
            handle.abort();
            // Hold the slot until the execution is actually dropped.
            let _ = handle.await;
            debug!(
                worker = %ctx.worker_id,
                task_id = %record.task_id,
                "execution aborted after timeout"
            );
            Err(TaskFailure::Timeout {
                timeout_ms: u64::try_from(ctx.task_timeout.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }
}

fn join_failure(err: JoinError) -> TaskFailure {
    if err.is_panic() {
        TaskFailure::Execution {
            error_type: "panic".to_string(),
            message: panic_message(err.into_panic()),
            trace: Vec::new(),
        }
    } else {
        TaskFailure::Execution {
            error_type: "cancelled".to_string(),
            message: err.to_string(),
            trace: Vec::new(),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task executor panicked".to_string()
    }
}

async fn publish(
    ctx: &SlotContext,
    stream: &str,
    record: &RunnableRecord,
    event_type: EventType,
    data: Value,
) -> Result<()> {
    let event = MissionEvent::new(
        record.mission_id.clone(),
        record.task_id.clone(),
        event_type,
        ctx.worker_id.clone(),
        data,
    );
    ctx.bus.append(stream, event.to_fields()?).await?;
    Ok(())
}

async fn ack(ctx: &SlotContext, entry: &StreamEntry) -> Result<()> {
    let acked = ctx
        .bus
        .ack(&ctx.runnable_stream, ctx.streams.group(), entry.id)
        .await?;
    if !acked {
        debug!(
            worker = %ctx.worker_id,
            entry_id = %entry.id,
            "entry was no longer pending at ack time"
        );
    }
    Ok(())
}
