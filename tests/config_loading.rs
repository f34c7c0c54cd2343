// tests/config_loading.rs

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use missiondag::config::{
    load_and_validate, load_from_path, parse_duration, MissionConfig, MAX_READ_BLOCK,
};
use missiondag::errors::{MissionError, PlanValidationError};
use missiondag::logging::resolve_level;
use missiondag::plan::{load_and_build, load_plan};
use missiondag::types::{LogLevel, TaskKind};

fn demo(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(path)
}

fn toml_file(contents: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn empty_file_yields_defaults() {
    let file = toml_file("");
    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg, MissionConfig::default());
    assert_eq!(cfg.worker.task_timeout, Duration::from_secs(600));
    assert_eq!(cfg.streams.consumer_group, "mission-workers");
}

#[test]
fn demo_config_is_valid() {
    let cfg = load_and_validate(demo("missiondag.toml")).unwrap();

    assert_eq!(cfg.reader.block, Duration::from_millis(50));
    assert_eq!(cfg.worker.instances, 2);
    assert_eq!(cfg.worker.claim_idle_after, Some(Duration::from_secs(300)));
    assert_eq!(cfg.scheduler.status_interval, Duration::from_secs(10));
    assert_eq!(cfg.log.level, Some(LogLevel::Info));
}

#[test]
fn raw_load_keeps_duration_strings() {
    let file = toml_file(
        r#"
[worker]
task_timeout = "90s"
"#,
    );
    let raw = load_from_path(file.path()).unwrap();
    assert_eq!(raw.worker.task_timeout, "90s");
    assert_eq!(raw.worker.concurrency, 4);
}

#[test]
fn zero_concurrency_is_rejected() {
    let file = toml_file(
        r#"
[worker]
concurrency = 0
"#,
    );

    match load_and_validate(file.path()) {
        Err(MissionError::Config(msg)) => {
            assert!(msg.contains("worker.concurrency"));
            assert!(msg.contains(">= 1"));
        }
        other => panic!("Expected Config error, got: {:?}", other),
    }
}

#[test]
fn zero_timeout_is_rejected() {
    let file = toml_file(
        r#"
[worker]
task_timeout = "0s"
"#,
    );
    assert!(matches!(
        load_and_validate(file.path()),
        Err(MissionError::Config(_))
    ));
}

#[test]
fn identical_stream_templates_are_rejected() {
    let file = toml_file(
        r#"
[streams]
runnable = "mission:{mission_id}"
events = "mission:{mission_id}"
"#,
    );

    match load_and_validate(file.path()) {
        Err(MissionError::Config(msg)) => assert!(msg.contains("must differ")),
        other => panic!("Expected Config error, got: {:?}", other),
    }
}

#[test]
fn bad_duration_names_the_field() {
    let file = toml_file(
        r#"
[reader]
block = "soon"
"#,
    );

    match load_and_validate(file.path()) {
        Err(MissionError::Config(msg)) => assert!(msg.starts_with("reader.block")),
        other => panic!("Expected Config error, got: {:?}", other),
    }
}

#[test]
fn invalid_toml_is_reported() {
    let file = toml_file("[worker\nconcurrency = ");
    assert!(matches!(
        load_and_validate(file.path()),
        Err(MissionError::Toml(_))
    ));
}

#[test]
fn durations_parse_with_units() {
    assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
    assert_eq!(parse_duration(" 3s "), Ok(Duration::from_secs(3)));
    assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
    assert!(parse_duration("10").is_err());
    assert!(parse_duration("5d").is_err());
}

#[test]
fn oversized_durations_are_errors_not_overflows() {
    let err = parse_duration("307445734561825861h").unwrap_err();
    assert!(err.contains("too large"), "{err}");
    assert!(parse_duration("18446744073709551615m").is_err());
    assert_eq!(
        parse_duration("18446744073709551615s"),
        Ok(Duration::from_secs(u64::MAX))
    );
}

#[test]
fn overflowing_task_timeout_is_rejected() {
    let file = toml_file(
        r#"
[worker]
task_timeout = "307445734561825861h"
"#,
    );

    match load_and_validate(file.path()) {
        Err(MissionError::Config(msg)) => {
            assert!(msg.starts_with("worker.task_timeout"));
            assert!(msg.contains("too large"));
        }
        other => panic!("Expected Config error, got: {:?}", other),
    }
}

#[test]
fn read_block_is_bounded() {
    let file = toml_file(
        r#"
[reader]
block = "18446744073709551615s"
"#,
    );
    match load_and_validate(file.path()) {
        Err(MissionError::Config(msg)) => assert!(msg.contains("reader.block")),
        other => panic!("Expected Config error, got: {:?}", other),
    }

    let at_limit = toml_file(&format!(
        "[reader]\nblock = \"{}s\"\n",
        MAX_READ_BLOCK.as_secs()
    ));
    let cfg = load_and_validate(at_limit.path()).unwrap();
    assert_eq!(cfg.reader.block, MAX_READ_BLOCK);
}

#[test]
fn explicit_level_wins_over_environment() {
    assert_eq!(
        resolve_level(Some(LogLevel::Debug), Some("error")),
        tracing::Level::DEBUG
    );
    assert_eq!(resolve_level(None, Some("warn")), tracing::Level::WARN);
    assert_eq!(resolve_level(None, Some("loud")), tracing::Level::INFO);
    assert_eq!(resolve_level(None, None), tracing::Level::INFO);
}

#[test]
fn demo_toml_plan_builds() {
    let (plan, dag) = load_and_build(demo("plans/research.toml")).unwrap();

    assert_eq!(plan.mission_id, "research-demo");
    assert_eq!(dag.len(), 5);
    assert_eq!(dag.initial_ready().len(), 1);

    let reduce = dag.task("research/search/reduce/0").unwrap();
    assert_eq!(reduce.kind, TaskKind::Reduce);
    assert_eq!(reduce.parents.len(), 2);
    assert_eq!(
        dag.task("research/plan/unit/0").unwrap().inputs["topic"],
        "event-sourced schedulers"
    );
}

#[test]
fn demo_json_plan_builds() {
    let (plan, dag) = load_and_build(demo("plans/research.json")).unwrap();
    assert_eq!(plan.mission_id, "research-demo-json");
    assert_eq!(dag.initial_ready().len(), 2);
}

#[test]
fn cyclic_plan_file_is_rejected() {
    match load_and_build(demo("plans/cycle.toml")) {
        Err(MissionError::PlanValidation(PlanValidationError::Cycle { involved })) => {
            assert_eq!(involved.len(), 2);
        }
        other => panic!("Expected cycle error, got: {:?}", other.map(|(p, _)| p)),
    }
}

#[test]
fn plan_with_unknown_kind_fails_to_parse() {
    let file = toml_file(
        r#"
mission_id = "m"

[[stage]]
name = "s"

[[stage.sub_stage]]
name = "x"

[[stage.sub_stage.task]]
kind = "map"
"#,
    );

    match load_plan(file.path()) {
        Err(MissionError::Toml(e)) => assert!(e.to_string().contains("map")),
        other => panic!("Expected TOML error, got: {:?}", other),
    }
}
