use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use missiondag::exec::{ExecFuture, ExecutionError, TaskExecutor, TaskInvocation};
use missiondag::types::TaskKind;
use serde_json::{json, Value};

/// What the fake executor does for a given task key.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Return this output immediately.
    Succeed(Value),
    /// Return an `ExecutionError` with this message.
    Fail(String),
    /// Never complete (until aborted by the worker's timeout).
    Hang,
    /// Sleep, then succeed with the default output.
    Delay(Duration),
    /// Panic with this message.
    Panic(String),
}

/// A fake executor that:
/// - records every invocation it receives
/// - tracks how many executions run at the same time
/// - succeeds by default, or follows a scripted [`Behaviour`] per task key.
///
/// The default output is `{"task_key": ..., "upstream": {...}}`.
#[derive(Default)]
pub struct ScriptedExecutor {
    behaviours: HashMap<String, Behaviour>,
    invocations: Mutex<Vec<(TaskKind, TaskInvocation)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, task_key: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(task_key.to_string(), behaviour);
        self
    }

    /// Task keys in the order executions started.
    pub fn executed(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|(_, inv)| inv.task_key.clone())
            .collect()
    }

    pub fn invocations(&self) -> Vec<(TaskKind, TaskInvocation)> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn times_executed(&self, task_key: &str) -> usize {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, inv)| inv.task_key == task_key)
            .count()
    }

    /// Highest number of executions observed running at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(&self.in_flight)
    }
}

/// Decrements the in-flight counter however the execution ends
/// (completion, abort on timeout, or panic).
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn default_output(invocation: &TaskInvocation) -> Value {
    json!({
        "task_key": invocation.task_key,
        "upstream": invocation.upstream,
    })
}

impl TaskExecutor for ScriptedExecutor {
    fn execute(&self, kind: TaskKind, invocation: TaskInvocation) -> ExecFuture<'_> {
        Box::pin(async move {
            self.invocations
                .lock()
                .unwrap()
                .push((kind, invocation.clone()));
            let _guard = self.enter();

            match self.behaviours.get(&invocation.task_key).cloned() {
                None => Ok(default_output(&invocation)),
                Some(Behaviour::Succeed(output)) => Ok(output),
                Some(Behaviour::Fail(message)) => {
                    Err(ExecutionError::new("ScriptedFailure", message))
                }
                Some(Behaviour::Hang) => std::future::pending().await,
                Some(Behaviour::Delay(delay)) => {
                    tokio::time::sleep(delay).await;
                    Ok(default_output(&invocation))
                }
                Some(Behaviour::Panic(message)) => panic!("{message}"),
            }
        })
    }
}
