//! Saga rollback: compensation order, continuation after a failed
//! compensation, and compensations lifted out of sub-procedures.

mod common;

use common::*;
use procedo_core::ExecutionOptions;
use procedo_types::config::EngineConfig;
use procedo_types::procedure::Command;
use serde_json::json;

#[tokio::test]
async fn test_compensations_run_in_reverse_order() {
    let probe = Probe::new();
    let engine = engine(&probe);
    let def = procedure(
        "saga",
        vec![
            compensated("S1"),
            compensated("S2"),
            compensated("S3"),
            fail("S4"),
            compensated("S5"),
        ],
    );

    let failure = engine
        .execute_definition(&def, json!({}), ExecutionOptions::default())
        .await
        .unwrap_err();

    assert!(failure.rollback_error.is_none());
    assert_eq!(
        probe.entries(),
        ["S1", "S2", "S3", "S4", "undo-S3", "undo-S2", "undo-S1"]
    );
}

#[tokio::test]
async fn test_failed_compensation_does_not_stop_rollback() {
    let probe = Probe::new();
    let engine = engine(&probe);
    let def = procedure(
        "saga-broken-undo",
        vec![
            compensated("S1"),
            record("S2").with_rollback(vec![fail("undo-S2")]),
            fail("S3"),
        ],
    );

    let failure = engine
        .execute_definition(&def, json!({}), ExecutionOptions::default())
        .await
        .unwrap_err();

    assert_eq!(probe.entries(), ["S1", "S2", "S3", "undo-S2", "undo-S1"]);
    let rollback = failure.rollback_error.as_ref().unwrap();
    assert_eq!(rollback.step, "S2");
    assert!(
        failure
            .to_string()
            .starts_with("step 'S3' (probe.fail) failed: probe failure; rollback also failed:")
    );
}

#[tokio::test]
async fn test_skipped_and_failed_steps_register_nothing() {
    let probe = Probe::new();
    let engine = engine(&probe);
    let def = procedure(
        "saga-partial",
        vec![
            compensated("skipped").guarded("false"),
            fail("broken").with_rollback(vec![record("undo-broken")]),
        ],
    );

    let failure = engine
        .execute_definition(&def, json!({}), ExecutionOptions::default())
        .await
        .unwrap_err();

    assert!(failure.rollback_error.is_none());
    assert_eq!(probe.entries(), ["broken"]);
}

#[tokio::test]
async fn test_rollback_runs_after_limit_abort() {
    let probe = Probe::new();
    let config = EngineConfig {
        max_commands: 2,
        ..EngineConfig::default()
    };
    let engine = engine_with(&probe, config, MapRepository::default());
    let def = procedure(
        "saga-limit",
        vec![compensated("a"), record("b"), record("c")],
    );

    let failure = engine
        .execute_definition(&def, json!({}), ExecutionOptions::default())
        .await
        .unwrap_err();

    assert!(failure.error.is_fatal());
    assert_eq!(probe.entries(), ["a", "b", "undo-a"]);
}

#[tokio::test]
async fn test_failing_callee_unwinds_its_own_compensations_first() {
    let probe = Probe::new();
    let repository = MapRepository::default()
        .with(procedure("child", vec![compensated("c1"), fail("c2")]));
    let engine = engine_with(&probe, EngineConfig::default(), repository);
    let def = procedure("parent", vec![compensated("p1"), call("child")]);

    engine
        .execute_definition(&def, json!({}), ExecutionOptions::default())
        .await
        .unwrap_err();

    assert_eq!(probe.entries(), ["p1", "c1", "c2", "undo-c1", "undo-p1"]);
}

#[tokio::test]
async fn test_lifted_compensation_sees_callee_variables() {
    let probe = Probe::new();
    let repository = MapRepository::default().with(procedure(
        "reserve",
        vec![
            record("reserve").with_rollback(vec![
                Command::new("probe.record").with_param("label", json!("=input.sku + '-released'")),
            ]),
        ],
    ));
    let engine = engine_with(&probe, EngineConfig::default(), repository);
    let def = procedure(
        "order",
        vec![
            call("reserve").with_input("sku", json!("=input.item")),
            fail("charge"),
        ],
    );

    let failure = engine
        .execute_definition(&def, json!({ "item": "A1" }), ExecutionOptions::default())
        .await
        .unwrap_err();

    assert!(failure.rollback_error.is_none());
    assert_eq!(probe.entries(), ["reserve", "charge", "A1-released"]);
}

#[tokio::test]
async fn test_successful_execution_discards_compensations() {
    let probe = Probe::new();
    let engine = engine(&probe);
    let def = procedure("saga-ok", vec![compensated("S1"), compensated("S2")]);

    let result = engine
        .execute_definition(&def, json!({}), ExecutionOptions::default())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(probe.entries(), ["S1", "S2"]);
}
