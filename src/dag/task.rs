// src/dag/task.rs

//! Task identifiers and immutable task definitions.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::TaskKind;

/// Deterministic task identifier derived from plan coordinates.
///
/// Format: `"{stage}/{sub_stage}/{kind}/{slice}"`. Identical plans always
/// produce identical ids, which is what makes DAG builds reproducible and lets
/// plans reference each other's tasks before the DAG exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn from_coordinates(stage: &str, sub_stage: &str, kind: TaskKind, slice: u32) -> Self {
        TaskId(format!("{stage}/{sub_stage}/{kind}/{slice}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        TaskId(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        TaskId(s)
    }
}

/// Immutable description of one task instance, created once at build time.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    pub id: TaskId,
    pub mission_id: String,
    pub kind: TaskKind,
    /// Human-readable label.
    pub key: String,
    pub stage: String,
    pub sub_stage: String,
    pub inputs: Value,
    /// Tasks that must succeed before this one (plan order, deduplicated).
    pub parents: Vec<TaskId>,
    /// Tasks that list this one as a parent.
    pub children: Vec<TaskId>,
}

impl TaskDefinition {
    pub fn indegree(&self) -> usize {
        self.parents.len()
    }

    /// Label used when a plan entry does not carry an explicit `key`.
    pub fn default_key(stage: &str, sub_stage: &str, kind: TaskKind, slice: u32) -> String {
        format!("{stage}.{sub_stage}.{kind}#{slice}")
    }
}
