// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{
    parse_duration, MissionConfig, RawMissionConfig, ReaderConfig, SchedulerConfig, WorkerConfig,
};
use crate::errors::{MissionError, Result};

/// Upper bound for one blocking broker read.
pub const MAX_READ_BLOCK: Duration = Duration::from_secs(60 * 60);

impl TryFrom<RawMissionConfig> for MissionConfig {
    type Error = MissionError;

    fn try_from(raw: RawMissionConfig) -> std::result::Result<Self, Self::Error> {
        validate_broker(&raw)?;
        validate_streams(&raw)?;

        let block = duration_field("reader.block", &raw.reader.block)?;
        if block > MAX_READ_BLOCK {
            return Err(MissionError::Config(format!(
                "reader.block must be at most {}s (got {}s)",
                MAX_READ_BLOCK.as_secs(),
                block.as_secs()
            )));
        }

        let reader = ReaderConfig {
            block,
            batch_size: at_least_one("reader.batch_size", raw.reader.batch_size)?,
        };

        let task_timeout = duration_field("worker.task_timeout", &raw.worker.task_timeout)?;
        if task_timeout.is_zero() {
            return Err(MissionError::Config(
                "[worker].task_timeout must be greater than zero".to_string(),
            ));
        }

        let claim_idle_after = raw
            .worker
            .claim_idle_after
            .as_deref()
            .map(|s| duration_field("worker.claim_idle_after", s))
            .transpose()?;

        let worker = WorkerConfig {
            concurrency: at_least_one("worker.concurrency", raw.worker.concurrency)?,
            task_timeout,
            instances: at_least_one("worker.instances", raw.worker.instances)?,
            claim_idle_after,
        };

        let scheduler = SchedulerConfig {
            status_interval: duration_field(
                "scheduler.status_interval",
                &raw.scheduler.status_interval,
            )?,
        };

        Ok(MissionConfig {
            broker: raw.broker,
            streams: raw.streams,
            reader,
            worker,
            scheduler,
            log: raw.log,
        })
    }
}

fn validate_broker(cfg: &RawMissionConfig) -> Result<()> {
    if cfg.broker.address.trim().is_empty() {
        return Err(MissionError::Config(
            "[broker].address must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_streams(cfg: &RawMissionConfig) -> Result<()> {
    let streams = &cfg.streams;

    if streams.runnable.trim().is_empty() || streams.events.trim().is_empty() {
        return Err(MissionError::Config(
            "[streams].runnable and [streams].events must not be empty".to_string(),
        ));
    }
    if streams.runnable == streams.events {
        return Err(MissionError::Config(format!(
            "[streams].runnable and [streams].events must differ (both are '{}')",
            streams.runnable
        )));
    }
    if streams.consumer_group.trim().is_empty() {
        return Err(MissionError::Config(
            "[streams].consumer_group must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn duration_field(name: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| MissionError::Config(format!("{name}: {e}")))
}

fn at_least_one(name: &str, value: usize) -> Result<usize> {
    if value == 0 {
        return Err(MissionError::Config(format!(
            "{name} must be >= 1 (got 0)"
        )));
    }
    Ok(value)
}
