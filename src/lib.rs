// src/lib.rs

pub mod bus;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod plan;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, StreamNames};
use crate::config::MissionConfig;
use crate::dag::{build_dag, MissionDag};
use crate::engine::{MissionReport, Scheduler, SchedulerOptions};
use crate::errors::Result;
use crate::exec::{TaskExecutor, Worker, WorkerOptions, WorkerStats};
use crate::plan::MissionPlan;

pub use crate::errors::{MissionError, PlanValidationError};
pub use crate::types::{TaskKind, TaskStatus};

/// Run a mission in-process and return its report.
///
/// This wires together:
/// - DAG build (a plan that fails validation never enqueues anything)
/// - the broker named by `[broker] address`
/// - `[worker] instances` workers sharing one consumer group
/// - the scheduler
pub async fn run_mission(
    plan: &MissionPlan,
    config: &MissionConfig,
    executor: Arc<dyn TaskExecutor>,
) -> Result<MissionReport> {
    let dag = build_dag(plan)?;
    let bus = bus::connect(&config.broker)?;
    run_mission_on(bus, dag, config, executor).await
}

/// Same as [`run_mission`] over an existing bus and an already built DAG.
///
/// A worker that exits before the mission settles (e.g. on a broker error)
/// ends the mission with that worker's error.
pub async fn run_mission_on(
    bus: Arc<dyn EventBus>,
    dag: MissionDag,
    config: &MissionConfig,
    executor: Arc<dyn TaskExecutor>,
) -> Result<MissionReport> {
    let streams = StreamNames::from_config(&config.streams);
    let worker_options = WorkerOptions::from_config(config);

    let mut shutdowns = Vec::with_capacity(config.worker.instances);
    let mut workers = JoinSet::new();
    for _ in 0..config.worker.instances {
        let worker = Worker::new(
            Arc::clone(&bus),
            Arc::clone(&executor),
            streams.clone(),
            dag.mission_id(),
            worker_options,
        );
        let id = worker.id().to_string();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        shutdowns.push(shutdown_tx);
        workers.spawn(async move { (id, worker.run(shutdown_rx).await) });
    }

    info!(
        mission_id = %dag.mission_id(),
        tasks = dag.len(),
        workers = workers.len(),
        "starting mission"
    );

    let mission_id = dag.mission_id().to_string();
    let scheduler = Scheduler::new(dag, bus, streams, SchedulerOptions::from_config(config));
    let outcome = tokio::select! {
        outcome = scheduler.run() => outcome,
        Some(joined) = workers.join_next() => Err(worker_exited_early(&mission_id, joined)),
    };

    for shutdown in shutdowns {
        // Workers that already exited dropped their receiver.
        let _ = shutdown.send(());
    }
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((id, Ok(stats))) => debug!(worker = %id, ?stats, "worker stopped"),
            Ok((id, Err(err))) => warn!(worker = %id, error = %err, "worker stopped with error"),
            Err(err) => warn!(error = %err, "worker task failed"),
        }
    }

    outcome
}

fn worker_exited_early(
    mission_id: &str,
    joined: std::result::Result<(String, Result<WorkerStats>), JoinError>,
) -> MissionError {
    match joined {
        Ok((id, Err(err))) => {
            error!(mission_id, worker = %id, error = %err, "worker failed; aborting mission");
            err
        }
        Ok((id, Ok(_))) => MissionError::Other(anyhow::anyhow!(
            "worker {id} stopped before mission {mission_id} settled"
        )),
        Err(err) => MissionError::Other(anyhow::anyhow!("worker task failed: {err}")),
    }
}

/// Load a plan and a config file from disk, initialise logging from the
/// config, and run the mission.
pub async fn run_from_paths(
    plan_path: impl AsRef<Path>,
    config_path: impl AsRef<Path>,
    executor: Arc<dyn TaskExecutor>,
) -> Result<MissionReport> {
    let config = config::load_and_validate(config_path)?;
    logging::init_logging(config.log.level)?;

    let plan = plan::load_plan(plan_path)?;
    run_mission(&plan, &config, executor).await
}
