// tests/dag_builder.rs

mod common;
use crate::common::{chain_plan, fan_out_plan, task_id, unit, PlanBuilder, TaskBuilder};

use missiondag::dag::{build_dag, TaskId};
use missiondag::errors::PlanValidationError;
use missiondag::plan::MissionPlan;
use missiondag::types::TaskKind;

#[test]
fn task_ids_are_derived_from_coordinates() {
    let plan = PlanBuilder::new("m-1")
        .with_task("research", "search", TaskBuilder::unit(3).build())
        .build();

    let dag = build_dag(&plan).unwrap();
    let ids: Vec<_> = dag.task_ids().map(TaskId::as_str).collect();

    assert_eq!(ids, vec!["research/search/unit/3"]);
    let def = dag.task("research/search/unit/3").unwrap();
    assert_eq!(def.key, "research.search.unit#3");
    assert_eq!(def.stage, "research");
    assert_eq!(def.sub_stage, "search");
    assert_eq!(def.mission_id, "m-1");
}

#[test]
fn identical_plans_build_identical_dags() {
    let a = build_dag(&fan_out_plan("m")).unwrap();
    let b = build_dag(&fan_out_plan("m")).unwrap();
    assert_eq!(a, b);
}

#[test]
fn chain_has_expected_indices() {
    let dag = build_dag(&chain_plan("m")).unwrap();

    assert_eq!(dag.len(), 3);
    assert_eq!(dag.initial_ready(), &[TaskId::from(unit(0))]);
    assert_eq!(
        dag.topo_order(),
        &[TaskId::from(unit(0)), TaskId::from(unit(1)), TaskId::from(unit(2))]
    );
    assert_eq!(dag.parents_of(&unit(2)), &[TaskId::from(unit(1))]);
    assert_eq!(dag.dependents_of(&unit(0)), &[TaskId::from(unit(1))]);
    assert_eq!(dag.deps_remaining().get(unit(1).as_str()), Some(&1));
    assert_eq!(
        dag.ancestors_of(&unit(2)),
        vec![TaskId::from(unit(0)), TaskId::from(unit(1))]
    );
}

#[test]
fn duplicate_dependencies_count_once() {
    let plan = PlanBuilder::new("m")
        .with_task("s", "x", TaskBuilder::unit(0).build())
        .with_task(
            "s",
            "x",
            TaskBuilder::reduce(0).after(&unit(0)).after(&unit(0)).build(),
        )
        .build();

    let dag = build_dag(&plan).unwrap();
    let reduce = task_id("s", "x", TaskKind::Reduce, 0);
    assert_eq!(dag.indegree(&reduce), Some(1));
    assert_eq!(dag.dependents_of(&unit(0)).len(), 1);
}

#[test]
fn cycle_is_rejected_with_involved_tasks() {
    let plan = PlanBuilder::new("m")
        .with_task("s", "x", TaskBuilder::unit(0).after(&unit(1)).build())
        .with_task("s", "x", TaskBuilder::unit(1).after(&unit(0)).build())
        .build();

    match build_dag(&plan) {
        Err(PlanValidationError::Cycle { involved }) => {
            assert_eq!(involved, vec![TaskId::from(unit(0)), TaskId::from(unit(1))]);
        }
        other => panic!("Expected Cycle error, got: {:?}", other),
    }
}

#[test]
fn empty_mission_id_is_rejected() {
    let plan = PlanBuilder::new("  ")
        .with_task("s", "x", TaskBuilder::unit(0).build())
        .build();
    assert_eq!(build_dag(&plan), Err(PlanValidationError::EmptyMissionId));
}

#[test]
fn plan_without_tasks_is_rejected() {
    let plan = MissionPlan::new("m");
    assert_eq!(
        build_dag(&plan),
        Err(PlanValidationError::EmptyPlan("m".to_string()))
    );
}

#[test]
fn names_with_separator_are_rejected() {
    let plan = PlanBuilder::new("m")
        .with_task("a/b", "x", TaskBuilder::unit(0).build())
        .build();

    match build_dag(&plan) {
        Err(PlanValidationError::InvalidName { what, name }) => {
            assert_eq!(what, "stage");
            assert_eq!(name, "a/b");
        }
        other => panic!("Expected InvalidName error, got: {:?}", other),
    }
}

#[test]
fn padded_names_are_rejected() {
    let plan = PlanBuilder::new("m")
        .with_task("research", " search", TaskBuilder::unit(0).build())
        .build();

    match build_dag(&plan) {
        Err(PlanValidationError::InvalidName { what, name }) => {
            assert_eq!(what, "sub-stage");
            assert_eq!(name, " search");
        }
        other => panic!("Expected InvalidName error, got: {:?}", other),
    }

    let plan = PlanBuilder::new("m")
        .with_task("research\t", "search", TaskBuilder::unit(0).build())
        .build();
    assert!(matches!(
        build_dag(&plan),
        Err(PlanValidationError::InvalidName { what: "stage", .. })
    ));
}

#[test]
fn duplicate_task_is_rejected() {
    let plan = PlanBuilder::new("m")
        .with_task("s", "x", TaskBuilder::unit(0).build())
        .with_task("s", "x", TaskBuilder::unit(0).key("again").build())
        .build();

    assert_eq!(
        build_dag(&plan),
        Err(PlanValidationError::DuplicateTask(TaskId::from(unit(0))))
    );
}

#[test]
fn unknown_dependency_is_rejected() {
    let plan = PlanBuilder::new("m")
        .with_task("s", "x", TaskBuilder::unit(0).after("s/x/unit/9").build())
        .build();

    match build_dag(&plan) {
        Err(PlanValidationError::UnknownDependency { task, dependency }) => {
            assert_eq!(task, TaskId::from(unit(0)));
            assert_eq!(dependency, "s/x/unit/9");
        }
        other => panic!("Expected UnknownDependency error, got: {:?}", other),
    }
}

#[test]
fn self_dependency_is_rejected() {
    let plan = PlanBuilder::new("m")
        .with_task("s", "x", TaskBuilder::unit(0).after(&unit(0)).build())
        .build();

    assert_eq!(
        build_dag(&plan),
        Err(PlanValidationError::SelfDependency(TaskId::from(unit(0))))
    );
}

#[test]
fn unknown_kind_string_names_accepted_kinds() {
    let err = "map".parse::<TaskKind>().unwrap_err();
    assert!(err.contains("map"));
    assert!(err.contains("unit") && err.contains("reduce"));
}
