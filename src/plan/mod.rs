// src/plan/mod.rs

//! Mission plan documents: stages -> sub-stages -> task instances.
//!
//! - [`model`] is the serde data model.
//! - [`loader`] reads a plan from TOML or JSON.

pub mod loader;
pub mod model;

pub use loader::{load_and_build, load_plan};
pub use model::{MissionPlan, StagePlan, SubStagePlan, TaskPlan};
