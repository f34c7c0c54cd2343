// src/exec/executor.rs

//! Pluggable task executor abstraction.
//!
//! Workers know nothing about what a task does: they hand a
//! [`TaskInvocation`] to a [`TaskExecutor`] and publish whatever comes back.
//! Production code plugs real handlers into a [`KindRouter`]; tests swap in a
//! deterministic fake and exercise the whole scheduling core with it.

use std::any::type_name;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::dag::TaskId;
use crate::types::TaskKind;

/// Boxed future returned by executors and handlers.
pub type ExecFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, ExecutionError>> + Send + 'a>>;

/// Everything an executor gets to see about one task execution.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInvocation {
    pub mission_id: String,
    pub task_id: TaskId,
    pub task_key: String,
    pub attempt: u32,
    pub inputs: Value,
    /// Parent outputs keyed by task id (reduce tasks only).
    pub upstream: BTreeMap<String, Value>,
}

/// Error returned by an executor for a failed execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error_type}: {message}")]
pub struct ExecutionError {
    pub error_type: String,
    pub message: String,
    /// Cause chain, outermost first.
    pub trace: Vec<String>,
}

impl ExecutionError {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            trace: Vec::new(),
        }
    }

    /// Capture a concrete error, recording its type name and source chain.
    pub fn typed<E>(err: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        let mut trace = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            trace.push(cause.to_string());
            source = cause.source();
        }

        Self {
            error_type: type_name::<E>().to_string(),
            message: err.to_string(),
            trace,
        }
    }
}

impl From<anyhow::Error> for ExecutionError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            error_type: "anyhow::Error".to_string(),
            message: err.to_string(),
            trace: err.chain().skip(1).map(|c| c.to_string()).collect(),
        }
    }
}

/// Terminal failure of one task, carried in `TASK_FAILED` event data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TaskFailure {
    /// The executor did not finish within the worker's wall-clock bound.
    #[error("task timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The executor returned an error or panicked.
    #[error("{error_type}: {message}")]
    Execution {
        error_type: String,
        message: String,
        #[serde(default)]
        trace: Vec<String>,
    },

    /// The runnable record named a task kind this worker does not know.
    #[error("unknown task kind '{task_type}': {message}")]
    UnknownKind { task_type: String, message: String },
}

impl TaskFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskFailure::Timeout { .. })
    }
}

impl From<ExecutionError> for TaskFailure {
    fn from(err: ExecutionError) -> Self {
        TaskFailure::Execution {
            error_type: err.error_type,
            message: err.message,
            trace: err.trace,
        }
    }
}

/// Trait abstracting what executing a task means.
///
/// Implementations must be shareable across a worker's execution slots.
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, kind: TaskKind, invocation: TaskInvocation) -> ExecFuture<'_>;
}

/// Handler for a single task kind.
pub trait TaskHandler: Send + Sync {
    fn handle(&self, invocation: TaskInvocation) -> ExecFuture<'_>;
}

impl<F, Fut> TaskHandler for F
where
    F: Fn(TaskInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ExecutionError>> + Send + 'static,
{
    fn handle(&self, invocation: TaskInvocation) -> ExecFuture<'_> {
        Box::pin(self(invocation))
    }
}

/// Executor that routes each kind to its own handler.
///
/// The match over [`TaskKind`] is exhaustive: a new kind does not compile
/// until it is routed here.
#[derive(Clone)]
pub struct KindRouter {
    unit: Arc<dyn TaskHandler>,
    reduce: Arc<dyn TaskHandler>,
}

impl KindRouter {
    pub fn new(unit: Arc<dyn TaskHandler>, reduce: Arc<dyn TaskHandler>) -> Self {
        Self { unit, reduce }
    }
}

impl TaskExecutor for KindRouter {
    fn execute(&self, kind: TaskKind, invocation: TaskInvocation) -> ExecFuture<'_> {
        match kind {
            TaskKind::Unit => self.unit.handle(invocation),
            TaskKind::Reduce => self.reduce.handle(invocation),
        }
    }
}
