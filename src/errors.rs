// src/errors.rs

//! Crate-wide error types.
//!
//! Infrastructure and build-time failures surface as [`MissionError`]. Task
//! level failures never do: they are recorded as `TASK_FAILED` events (see
//! [`crate::exec::TaskFailure`]) and stay isolated to the failing branch.

use thiserror::Error;

use crate::dag::TaskId;

/// Why a mission plan was rejected by the DAG builder.
///
/// Fatal at build time: a mission whose plan fails validation never starts
/// and nothing is enqueued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanValidationError {
    #[error("mission plan has an empty mission_id")]
    EmptyMissionId,

    #[error("mission plan '{0}' contains no tasks")]
    EmptyPlan(String),

    #[error(
        "invalid {what} name '{name}': names must be non-empty, must not contain '/' and must not start or end with whitespace"
    )]
    InvalidName { what: &'static str, name: String },

    #[error("duplicate task id '{0}' (two tasks share stage, sub-stage, kind and slice)")]
    DuplicateTask(TaskId),

    #[error("task '{task}' has unknown dependency '{dependency}'")]
    UnknownDependency { task: TaskId, dependency: String },

    #[error("task '{0}' cannot depend on itself")]
    SelfDependency(TaskId),

    #[error("cycle detected in mission DAG involving tasks {involved:?}")]
    Cycle { involved: Vec<TaskId> },
}

#[derive(Error, Debug)]
pub enum MissionError {
    #[error("Plan validation error: {0}")]
    PlanValidation(#[from] PlanValidationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("No consumer group '{group}' on stream '{stream}'")]
    UnknownGroup { stream: String, group: String },

    #[error("Malformed stream record: {0}")]
    Codec(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, MissionError>;
