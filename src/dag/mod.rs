// src/dag/mod.rs

//! Mission DAG representation and construction.
//!
//! - [`task`] holds task ids and immutable task definitions.
//! - [`graph`] holds the validated [`MissionDag`] and its indices.
//! - [`builder`] turns a [`crate::plan::MissionPlan`] into a `MissionDag`.

pub mod builder;
pub mod graph;
pub mod task;

pub use builder::build_dag;
pub use graph::MissionDag;
pub use task::{TaskDefinition, TaskId};
