// src/engine/mod.rs

//! Mission scheduler.
//!
//! Scheduler state is a fold over the mission's events stream and can be
//! thrown away and rebuilt at any time.
//!
//! - [`state`]: `SchedulerState` and the pure fold `apply`, plus [`replay`].
//! - [`core`]: turns folds into enqueue commands; no IO.
//! - [`runtime`]: the async shell tailing the events stream.
//! - [`report`]: per-task mission outcome.

pub mod core;
pub mod report;
pub mod runtime;
pub mod state;

pub use core::{CoreCommand, CoreStep, Dispatch, SchedulerCore};
pub use report::{MissionReport, TaskReport};
pub use runtime::{Scheduler, SchedulerOptions};
pub use state::{
    replay, Applied, IgnoreReason, SchedulerCounters, SchedulerState, StatusSummary,
};
