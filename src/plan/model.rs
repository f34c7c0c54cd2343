// src/plan/model.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::TaskKind;

/// A mission plan as read from a TOML or JSON document.
///
/// ```toml
/// mission_id = "m-1"
///
/// [[stage]]
/// name = "research"
///
/// [[stage.sub_stage]]
/// name = "search"
///
/// [[stage.sub_stage.task]]
/// kind = "unit"
/// slice = 0
/// inputs = { query = "rust schedulers" }
///
/// [[stage.sub_stage.task]]
/// kind = "reduce"
/// depends_on = ["research/search/unit/0"]
/// ```
///
/// Dependencies reference other tasks by their deterministic id
/// (`"{stage}/{sub_stage}/{kind}/{slice}"`), see [`crate::dag::TaskId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionPlan {
    pub mission_id: String,

    /// Ordered stages.
    #[serde(default, rename = "stage")]
    pub stages: Vec<StagePlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePlan {
    pub name: String,

    #[serde(default, rename = "sub_stage")]
    pub sub_stages: Vec<SubStagePlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubStagePlan {
    pub name: String,

    /// Concrete task instances of this sub-stage.
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskPlan>,
}

/// One concrete task instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub kind: TaskKind,

    /// Distinguishes several tasks of the same kind within a sub-stage.
    #[serde(default)]
    pub slice: u32,

    /// Optional human-readable label; derived from the coordinates if absent.
    #[serde(default)]
    pub key: Option<String>,

    /// Opaque payload handed to the task executor.
    #[serde(default)]
    pub inputs: Value,

    /// Ids of tasks that must succeed before this one may run.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl MissionPlan {
    pub fn new(mission_id: impl Into<String>) -> Self {
        Self {
            mission_id: mission_id.into(),
            stages: Vec::new(),
        }
    }

    /// Total number of task instances across all stages.
    pub fn task_count(&self) -> usize {
        self.stages
            .iter()
            .flat_map(|s| s.sub_stages.iter())
            .map(|ss| ss.tasks.len())
            .sum()
    }
}
