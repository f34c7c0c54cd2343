// src/bus/record.rs

//! Wire codec for the two per-mission streams.
//!
//! Entries are flat string maps; structured payloads (`inputs`, `upstream`,
//! `data`) are embedded as JSON strings and timestamps as RFC 3339.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bus::Fields;
use crate::dag::TaskId;
use crate::errors::{MissionError, Result};
use crate::types::TaskKind;

/// Lifecycle event types carried on the events stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    TaskEnqueued,
    TaskStarted,
    TaskSucceeded,
    TaskFailed,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::TaskEnqueued => "TASK_ENQUEUED",
            EventType::TaskStarted => "TASK_STARTED",
            EventType::TaskSucceeded => "TASK_SUCCEEDED",
            EventType::TaskFailed => "TASK_FAILED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = MissionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "TASK_ENQUEUED" => Ok(EventType::TaskEnqueued),
            "TASK_STARTED" => Ok(EventType::TaskStarted),
            "TASK_SUCCEEDED" => Ok(EventType::TaskSucceeded),
            "TASK_FAILED" => Ok(EventType::TaskFailed),
            other => Err(MissionError::Codec(format!("unknown event_type '{other}'"))),
        }
    }
}

/// Immutable lifecycle record on a mission's events stream.
///
/// The events stream is the canonical source of truth: scheduler state is a
/// fold over these records.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionEvent {
    pub mission_id: String,
    pub task_id: TaskId,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    /// Scheduler or worker instance that appended the event.
    pub emitter_id: String,
    pub data: Value,
}

impl MissionEvent {
    pub fn new(
        mission_id: impl Into<String>,
        task_id: TaskId,
        event_type: EventType,
        emitter_id: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            mission_id: mission_id.into(),
            task_id,
            event_type,
            timestamp: Utc::now(),
            emitter_id: emitter_id.into(),
            data,
        }
    }

    pub fn to_fields(&self) -> Result<Fields> {
        let mut fields = Fields::new();
        fields.insert("mission_id".into(), self.mission_id.clone());
        fields.insert("task_id".into(), self.task_id.to_string());
        fields.insert("event_type".into(), self.event_type.to_string());
        fields.insert("timestamp".into(), self.timestamp.to_rfc3339());
        fields.insert("emitter_id".into(), self.emitter_id.clone());
        fields.insert("data".into(), serde_json::to_string(&self.data)?);
        Ok(fields)
    }

    pub fn from_fields(fields: &Fields) -> Result<Self> {
        let timestamp = DateTime::parse_from_rfc3339(required(fields, "timestamp")?)
            .map_err(|e| MissionError::Codec(format!("invalid timestamp: {e}")))?
            .with_timezone(&Utc);

        Ok(Self {
            mission_id: required(fields, "mission_id")?.to_string(),
            task_id: TaskId::from(required(fields, "task_id")?),
            event_type: required(fields, "event_type")?.parse()?,
            timestamp,
            emitter_id: required(fields, "emitter_id")?.to_string(),
            data: optional_json(fields, "data")?,
        })
    }
}

/// Command from the scheduler asking some worker to execute one task.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnableRecord {
    pub mission_id: String,
    pub task_id: TaskId,
    /// Raw kind tag; see [`RunnableRecord::kind`].
    pub task_type: String,
    pub task_key: String,
    pub attempt: u32,
    pub inputs: Value,
    /// Outputs of the task's parents, keyed by task id. Only populated for
    /// [`TaskKind::Reduce`] tasks.
    pub upstream: BTreeMap<String, Value>,
}

impl RunnableRecord {
    /// Parse the kind tag. Kept separate from decoding so a worker can still
    /// report an unknown kind against the right task id.
    pub fn kind(&self) -> std::result::Result<TaskKind, String> {
        self.task_type.parse()
    }

    pub fn to_fields(&self) -> Result<Fields> {
        let mut fields = Fields::new();
        fields.insert("mission_id".into(), self.mission_id.clone());
        fields.insert("task_id".into(), self.task_id.to_string());
        fields.insert("task_type".into(), self.task_type.clone());
        fields.insert("task_key".into(), self.task_key.clone());
        fields.insert("attempt".into(), self.attempt.to_string());
        fields.insert("inputs".into(), serde_json::to_string(&self.inputs)?);
        fields.insert("upstream".into(), serde_json::to_string(&self.upstream)?);
        Ok(fields)
    }

    pub fn from_fields(fields: &Fields) -> Result<Self> {
        let attempt = required(fields, "attempt")?
            .parse::<u32>()
            .map_err(|e| MissionError::Codec(format!("invalid attempt: {e}")))?;

        let upstream = match fields.get("upstream") {
            Some(raw) => serde_json::from_str(raw)?,
            None => BTreeMap::new(),
        };

        Ok(Self {
            mission_id: required(fields, "mission_id")?.to_string(),
            task_id: TaskId::from(required(fields, "task_id")?),
            task_type: required(fields, "task_type")?.to_string(),
            task_key: required(fields, "task_key")?.to_string(),
            attempt,
            inputs: optional_json(fields, "inputs")?,
            upstream,
        })
    }
}

fn required<'a>(fields: &'a Fields, name: &str) -> Result<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| MissionError::Codec(format!("missing field '{name}'")))
}

fn optional_json(fields: &Fields, name: &str) -> Result<Value> {
    match fields.get(name) {
        Some(raw) => Ok(serde_json::from_str(raw)?),
        None => Ok(Value::Null),
    }
}
