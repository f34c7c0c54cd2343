// src/plan/loader.rs

use std::fs;
use std::path::Path;

use crate::dag::{build_dag, MissionDag};
use crate::errors::Result;
use crate::plan::model::MissionPlan;

/// Load a mission plan from disk.
///
/// `.json` files are parsed as JSON, everything else as TOML. This performs
/// deserialization only; use [`load_and_build`] to also validate the DAG.
pub fn load_plan(path: impl AsRef<Path>) -> Result<MissionPlan> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let plan = if is_json {
        serde_json::from_str(&contents)?
    } else {
        toml::from_str(&contents)?
    };

    Ok(plan)
}

/// Load a plan and build its DAG, failing on any validation error.
pub fn load_and_build(path: impl AsRef<Path>) -> Result<(MissionPlan, MissionDag)> {
    let plan = load_plan(path)?;
    let dag = build_dag(&plan)?;
    Ok((plan, dag))
}
