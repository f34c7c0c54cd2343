use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of task kinds a mission can contain.
///
/// Workers route on this with an exhaustive `match`, so adding a kind is a
/// compile-time decision rather than a silently ignored string tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// A single unit of work.
    Unit,
    /// An aggregation over the outputs of its parents.
    Reduce,
}

impl TaskKind {
    pub const ALL: [TaskKind; 2] = [TaskKind::Unit, TaskKind::Reduce];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Unit => "unit",
            TaskKind::Reduce => "reduce",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unit" => Ok(TaskKind::Unit),
            "reduce" => Ok(TaskKind::Reduce),
            other => Err(format!(
                "unknown task kind '{other}' (expected \"unit\" or \"reduce\")"
            )),
        }
    }
}

/// Per-task status as seen by the scheduler.
///
/// `Pending` and `Ready` are derived by the scheduler itself; `Running`,
/// `Succeeded` and `Failed` are only ever reached by folding events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// At least one parent has not succeeded yet.
    Pending,
    /// All parents succeeded; no evidence of an enqueue yet.
    Ready,
    /// Enqueued or picked up by a worker.
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// Ready or running: the mission cannot finish while any task is active.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Ready | TaskStatus::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Ready => "READY",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Succeeded => "SUCCEEDED",
            TaskStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Log level as accepted in the `[log]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}
