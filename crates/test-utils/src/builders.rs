#![allow(dead_code)]

use std::time::Duration;

use missiondag::config::MissionConfig;
use missiondag::dag::{build_dag, MissionDag, TaskId};
use missiondag::plan::{MissionPlan, StagePlan, SubStagePlan, TaskPlan};
use missiondag::types::TaskKind;
use serde_json::Value;

/// Id of the task at the given plan coordinates, as a plain string.
pub fn task_id(stage: &str, sub_stage: &str, kind: TaskKind, slice: u32) -> String {
    TaskId::from_coordinates(stage, sub_stage, kind, slice).to_string()
}

/// Builder for `MissionPlan` to simplify test setup.
///
/// Stages and sub-stages are created on first use, in insertion order.
pub struct PlanBuilder {
    plan: MissionPlan,
}

impl PlanBuilder {
    pub fn new(mission_id: &str) -> Self {
        Self {
            plan: MissionPlan::new(mission_id),
        }
    }

    pub fn with_task(mut self, stage: &str, sub_stage: &str, task: TaskPlan) -> Self {
        let stage_idx = match self.plan.stages.iter().position(|s| s.name == stage) {
            Some(idx) => idx,
            None => {
                self.plan.stages.push(StagePlan {
                    name: stage.to_string(),
                    sub_stages: Vec::new(),
                });
                self.plan.stages.len() - 1
            }
        };
        let stage_plan = &mut self.plan.stages[stage_idx];

        let sub_idx = match stage_plan
            .sub_stages
            .iter()
            .position(|ss| ss.name == sub_stage)
        {
            Some(idx) => idx,
            None => {
                stage_plan.sub_stages.push(SubStagePlan {
                    name: sub_stage.to_string(),
                    tasks: Vec::new(),
                });
                stage_plan.sub_stages.len() - 1
            }
        };

        stage_plan.sub_stages[sub_idx].tasks.push(task);
        self
    }

    pub fn build(self) -> MissionPlan {
        self.plan
    }

    pub fn build_dag(self) -> MissionDag {
        build_dag(&self.plan).expect("Failed to build valid DAG from builder")
    }
}

/// Builder for `TaskPlan`.
pub struct TaskBuilder {
    task: TaskPlan,
}

impl TaskBuilder {
    pub fn new(kind: TaskKind, slice: u32) -> Self {
        Self {
            task: TaskPlan {
                kind,
                slice,
                key: None,
                inputs: Value::Null,
                depends_on: vec![],
            },
        }
    }

    pub fn unit(slice: u32) -> Self {
        Self::new(TaskKind::Unit, slice)
    }

    pub fn reduce(slice: u32) -> Self {
        Self::new(TaskKind::Reduce, slice)
    }

    pub fn key(mut self, key: &str) -> Self {
        self.task.key = Some(key.to_string());
        self
    }

    pub fn inputs(mut self, inputs: Value) -> Self {
        self.task.inputs = inputs;
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.depends_on.push(dep.to_string());
        self
    }

    pub fn build(self) -> TaskPlan {
        self.task
    }
}

/// Default config with short read blocks and timeouts for tests.
pub fn fast_config() -> MissionConfig {
    let mut cfg = MissionConfig::default();
    cfg.reader.block = Duration::from_millis(20);
    cfg.worker.task_timeout = Duration::from_secs(2);
    cfg.scheduler.status_interval = Duration::from_millis(200);
    cfg
}
