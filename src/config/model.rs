// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::types::LogLevel;

/// Configuration file as read from TOML, before validation.
///
/// ```toml
/// [broker]
/// address = "memory://local"
///
/// [streams]
/// runnable = "mission:{mission_id}:runnable"
/// events = "mission:{mission_id}:events"
/// consumer_group = "mission-workers"
///
/// [reader]
/// block = "1s"
/// batch_size = 16
///
/// [worker]
/// concurrency = 4
/// task_timeout = "10m"
///
/// [scheduler]
/// status_interval = "30s"
/// ```
///
/// All sections are optional and have reasonable defaults. Durations are
/// strings such as `"250ms"`, `"3s"`, `"10m"` or `"1h"`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawMissionConfig {
    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub streams: StreamConfig,

    #[serde(default)]
    pub reader: RawReaderSection,

    #[serde(default)]
    pub worker: RawWorkerSection,

    #[serde(default)]
    pub scheduler: RawSchedulerSection,

    #[serde(default)]
    pub log: LogSection,
}

/// `[broker]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_address")]
    pub address: String,
}

fn default_broker_address() -> String {
    "memory://local".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: default_broker_address(),
        }
    }
}

/// `[streams]` section: stream name templates and the worker group name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_runnable_stream")]
    pub runnable: String,

    #[serde(default = "default_events_stream")]
    pub events: String,

    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
}

fn default_runnable_stream() -> String {
    "mission:{mission_id}:runnable".to_string()
}

fn default_events_stream() -> String {
    "mission:{mission_id}:events".to_string()
}

fn default_consumer_group() -> String {
    "mission-workers".to_string()
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            runnable: default_runnable_stream(),
            events: default_events_stream(),
            consumer_group: default_consumer_group(),
        }
    }
}

/// `[reader]` section, raw form.
#[derive(Debug, Clone, Deserialize)]
pub struct RawReaderSection {
    #[serde(default = "default_block")]
    pub block: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_block() -> String {
    "1s".to_string()
}

fn default_batch_size() -> usize {
    16
}

impl Default for RawReaderSection {
    fn default() -> Self {
        Self {
            block: default_block(),
            batch_size: default_batch_size(),
        }
    }
}

/// `[worker]` section, raw form.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWorkerSection {
    /// In-flight executions per worker.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Hard wall-clock bound per task execution.
    #[serde(default = "default_task_timeout")]
    pub task_timeout: String,

    /// Workers started in-process by [`crate::run_mission`].
    #[serde(default = "default_instances")]
    pub instances: usize,

    /// Claim entries another worker left pending this long.
    #[serde(default)]
    pub claim_idle_after: Option<String>,
}

fn default_concurrency() -> usize {
    4
}

fn default_task_timeout() -> String {
    "10m".to_string()
}

fn default_instances() -> usize {
    1
}

impl Default for RawWorkerSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            task_timeout: default_task_timeout(),
            instances: default_instances(),
            claim_idle_after: None,
        }
    }
}

/// `[scheduler]` section, raw form.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSchedulerSection {
    #[serde(default = "default_status_interval")]
    pub status_interval: String,
}

fn default_status_interval() -> String {
    "30s".to_string()
}

impl Default for RawSchedulerSection {
    fn default() -> Self {
        Self {
            status_interval: default_status_interval(),
        }
    }
}

/// `[log]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub struct LogSection {
    #[serde(default)]
    pub level: Option<LogLevel>,
}

/// Validated configuration used by the rest of the crate.
///
/// Only obtainable through `TryFrom<RawMissionConfig>` (see
/// [`crate::config::validate`]) or [`MissionConfig::default`].
#[derive(Debug, Clone, PartialEq)]
pub struct MissionConfig {
    pub broker: BrokerConfig,
    pub streams: StreamConfig,
    pub reader: ReaderConfig,
    pub worker: WorkerConfig,
    pub scheduler: SchedulerConfig,
    pub log: LogSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    pub block: Duration,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub task_timeout: Duration,
    pub instances: usize,
    pub claim_idle_after: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub status_interval: Duration,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            streams: StreamConfig::default(),
            reader: ReaderConfig {
                block: Duration::from_secs(1),
                batch_size: default_batch_size(),
            },
            worker: WorkerConfig {
                concurrency: default_concurrency(),
                task_timeout: Duration::from_secs(10 * 60),
                instances: default_instances(),
                claim_idle_after: None,
            },
            scheduler: SchedulerConfig {
                status_interval: Duration::from_secs(30),
            },
            log: LogSection::default(),
        }
    }
}

/// Parse a duration string like `"250ms"`, `"3s"`, `"10m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    let secs_per_unit = match unit_part.trim().to_lowercase().as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        unit => {
            return Err(format!(
                "unsupported duration unit '{unit}'; expected ms, s, m, or h"
            ));
        }
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}
