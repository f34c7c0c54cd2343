// src/exec/mod.rs

//! Task execution layer.
//!
//! Workers pull runnable records from a mission's runnable stream, run them
//! through a pluggable [`TaskExecutor`], and report the outcome as lifecycle
//! events on the mission's events stream.
//!
//! - [`executor`] defines the executor seam, task invocations and failures.
//! - [`worker`] owns the consume loop and the bounded pool of slots.
//! - [`task_runner`] runs a single record: started, execute, terminal, ack.

pub mod executor;
pub(crate) mod task_runner;
pub mod worker;

pub use executor::{
    ExecFuture, ExecutionError, KindRouter, TaskExecutor, TaskFailure, TaskHandler,
    TaskInvocation,
};
pub use worker::{Worker, WorkerHandle, WorkerOptions, WorkerStats};
