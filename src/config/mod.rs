// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs`: the TOML-backed raw model and the validated model.
//! - `loader.rs`: read a config file from disk.
//! - `validate.rs`: `RawMissionConfig -> MissionConfig`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    parse_duration, BrokerConfig, LogSection, MissionConfig, RawMissionConfig, ReaderConfig,
    SchedulerConfig, StreamConfig, WorkerConfig,
};
pub use validate::MAX_READ_BLOCK;
