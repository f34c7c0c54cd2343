// src/bus/streams.rs

use crate::config::StreamConfig;

const MISSION_PLACEHOLDER: &str = "{mission_id}";

/// Per-mission stream names derived from configurable templates.
///
/// Templates may omit `{mission_id}`, in which case several missions share a
/// physical stream and readers drop foreign entries by `mission_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamNames {
    runnable_template: String,
    events_template: String,
    group: String,
}

impl StreamNames {
    pub fn new(
        runnable_template: impl Into<String>,
        events_template: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            runnable_template: runnable_template.into(),
            events_template: events_template.into(),
            group: group.into(),
        }
    }

    pub fn from_config(cfg: &StreamConfig) -> Self {
        Self::new(&cfg.runnable, &cfg.events, &cfg.consumer_group)
    }

    /// Stream carrying runnable records for `mission_id`.
    pub fn runnable(&self, mission_id: &str) -> String {
        self.runnable_template.replace(MISSION_PLACEHOLDER, mission_id)
    }

    /// Stream carrying lifecycle events for `mission_id`.
    pub fn events(&self, mission_id: &str) -> String {
        self.events_template.replace(MISSION_PLACEHOLDER, mission_id)
    }

    /// Consumer group shared by all workers on the runnable stream.
    pub fn group(&self) -> &str {
        &self.group
    }
}

impl Default for StreamNames {
    fn default() -> Self {
        Self::from_config(&StreamConfig::default())
    }
}
