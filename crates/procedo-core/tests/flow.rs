//! Flow control: branching, switch, try/catch and sub-procedure calls.

mod common;

use common::*;
use procedo_core::ExecutionOptions;
use procedo_core::engine::{EngineError, LimitViolation};
use procedo_types::config::EngineConfig;
use procedo_types::execution::TraceStatus;
use procedo_types::procedure::Command;
use serde_json::json;

// ---------------------------------------------------------------------------
// flow.if / flow.switch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_if_runs_matching_branch() {
    let probe = Probe::new();
    let engine = engine(&probe);
    let def = procedure(
        "branching",
        vec![
            Command::new("flow.if")
                .with_condition("input.total > 100")
                .with_then(vec![record("gold")])
                .with_else(vec![record("standard")])
                .aliased("route"),
        ],
    )
    .with_result("branch", "route.branch");

    let big = engine
        .execute_definition(&def, json!({ "total": 150 }), ExecutionOptions::default())
        .await
        .unwrap();
    let small = engine
        .execute_definition(&def, json!({ "total": 10 }), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(big.result["branch"], json!("then"));
    assert_eq!(small.result["branch"], json!("else"));
    assert_eq!(probe.entries(), ["gold", "standard"]);
}

#[tokio::test]
async fn test_switch_matches_case_then_default() {
    let probe = Probe::new();
    let engine = engine(&probe);
    let def = procedure(
        "switching",
        vec![
            Command::new("flow.switch")
                .with_expression("input.tier")
                .with_case("gold", vec![record("case-gold")])
                .with_case("silver", vec![record("case-silver")])
                .with_default(vec![record("case-default")])
                .aliased("matched"),
        ],
    )
    .with_result("matched", "matched.matched");

    let gold = engine
        .execute_definition(&def, json!({ "tier": "gold" }), ExecutionOptions::default())
        .await
        .unwrap();
    let other = engine
        .execute_definition(&def, json!({ "tier": "bronze" }), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(gold.result["matched"], json!("gold"));
    assert_eq!(other.result["matched"], json!("default"));
    assert_eq!(probe.entries(), ["case-gold", "case-default"]);
}

#[tokio::test]
async fn test_switch_without_match_or_default_is_noop() {
    let probe = Probe::new();
    let engine = engine(&probe);
    let def = procedure(
        "switch-noop",
        vec![
            Command::new("flow.switch")
                .with_expression("input.flag")
                .with_case("false", vec![record("no")])
                .aliased("s"),
        ],
    )
    .with_result("matched", "s.matched");

    let result = engine
        .execute_definition(&def, json!({ "flag": true }), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.result["matched"], json!(null));
    assert!(probe.entries().is_empty());
}

// ---------------------------------------------------------------------------
// flow.try
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_try_catch_exposes_error_only_inside_catch() {
    let probe = Probe::new();
    let engine = engine(&probe);
    let def = procedure(
        "try-catch",
        vec![
            Command::new("flow.try")
                .with_try(vec![
                    Command::new("check.fail")
                        .with_param("code", json!("E1"))
                        .with_param("message", json!("boom")),
                    record("unreachable"),
                ])
                .with_catch(vec![
                    Command::new("compute.set")
                        .with_value("caught_code", json!("=error.code"))
                        .with_value("caught_message", json!("=error.message")),
                    Command::new("probe.vars"),
                ])
                .aliased("attempt"),
            Command::new("probe.vars"),
        ],
    )
    .with_result("code", "caught_code")
    .with_result("message", "caught_message")
    .with_result("caught", "attempt.caught");

    let result = engine
        .execute_definition(&def, json!({}), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.result["code"], json!("E1"));
    assert_eq!(result.result["message"], json!("boom"));
    assert_eq!(result.result["caught"], json!(true));
    assert_eq!(
        probe.entries(),
        [
            "vars:caught_code,caught_message,error,input,now",
            "vars:attempt,caught_code,caught_message,input,now",
        ]
    );
}

#[tokio::test]
async fn test_try_restores_previous_error_binding() {
    let probe = Probe::new();
    let engine = engine(&probe);
    let def = procedure(
        "try-restore",
        vec![
            Command::new("compute.set").with_value("error", json!("mine")),
            Command::new("flow.try")
                .with_try(vec![fail("inner")])
                .with_catch(vec![]),
        ],
    )
    .with_result("error", "error");

    let result = engine
        .execute_definition(&def, json!({}), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.result["error"], json!("mine"));
}

#[tokio::test]
async fn test_try_without_catch_propagates_original_error() {
    let probe = Probe::new();
    let engine = engine(&probe);
    let def = procedure(
        "try-rethrow",
        vec![Command::new("flow.try").with_try(vec![fail("inner")])],
    );

    let failure = engine
        .execute_definition(&def, json!({}), ExecutionOptions::default())
        .await
        .unwrap_err();

    assert_eq!(
        failure.error.to_string(),
        "step 'inner' (probe.fail) failed: probe failure"
    );
}

#[tokio::test]
async fn test_non_raised_errors_use_execution_error_code() {
    let probe = Probe::new();
    let engine = engine(&probe);
    let def = procedure(
        "try-generic",
        vec![
            Command::new("flow.try")
                .with_try(vec![fail("inner")])
                .with_catch(vec![
                    Command::new("compute.set").with_value("code", json!("=error.code")),
                ]),
        ],
    )
    .with_result("code", "code");

    let result = engine
        .execute_definition(&def, json!({}), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.result["code"], json!("EXECUTION_ERROR"));
}

#[tokio::test]
async fn test_fatal_errors_are_not_caught() {
    let probe = Probe::new();
    let config = EngineConfig {
        max_commands: 2,
        ..EngineConfig::default()
    };
    let engine = engine_with(&probe, config, MapRepository::default());
    let def = procedure(
        "try-fatal",
        vec![
            Command::new("flow.try")
                .with_try(vec![record("one"), record("two")])
                .with_catch(vec![record("caught")]),
        ],
    );

    let failure = engine
        .execute_definition(&def, json!({}), ExecutionOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error.limit_violation(),
        Some(LimitViolation::Commands { .. })
    ));
    assert_eq!(probe.entries(), ["one"]);
}

// ---------------------------------------------------------------------------
// flow.call
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_call_returns_child_result_map() {
    let probe = Probe::new();
    let repository = MapRepository::default().with(
        procedure(
            "price",
            vec![
                Command::new("compute.eval")
                    .with_expression("input.base + '-priced'")
                    .aliased("priced"),
            ],
        )
        .with_result("label", "priced"),
    );
    let engine = engine_with(&probe, EngineConfig::default(), repository);
    let def = procedure(
        "order",
        vec![
            call("price")
                .with_input("base", json!("=input.sku"))
                .aliased("pricing"),
            Command::new("probe.vars"),
        ],
    )
    .with_result("label", "pricing.label");

    let result = engine
        .execute_definition(&def, json!({ "sku": "A1" }), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.result["label"], json!("A1-priced"));
    // Child variables never leak into the parent.
    assert_eq!(probe.entries(), ["vars:input,now,pricing"]);
    // The child's step shows up in the shared trace.
    assert_eq!(result.trace.len(), 3);
}

#[tokio::test]
async fn test_calls_up_to_max_depth_succeed() {
    let probe = Probe::new();
    let repository = MapRepository::default()
        .with(procedure("p2", vec![record("p2"), call("p3")]))
        .with(procedure("p3", vec![record("p3")]));
    let config = EngineConfig {
        max_call_depth: 3,
        ..EngineConfig::default()
    };
    let engine = engine_with(&probe, config, repository);
    let def = procedure("p1", vec![record("p1"), call("p2")]);

    engine
        .execute_definition(&def, json!({}), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(probe.entries(), ["p1", "p2", "p3"]);
}

#[tokio::test]
async fn test_call_beyond_max_depth_fails_without_side_effects() {
    let probe = Probe::new();
    let repository = MapRepository::default()
        .with(procedure("p2", vec![call("p3")]))
        .with(procedure("p3", vec![call("p4")]))
        .with(procedure("p4", vec![record("p4-ran")]));
    let config = EngineConfig {
        max_call_depth: 3,
        ..EngineConfig::default()
    };
    let engine = engine_with(&probe, config, repository);
    let def = procedure("p1", vec![call("p2")]);

    let failure = engine
        .execute_definition(&def, json!({}), ExecutionOptions::default())
        .await
        .unwrap_err();

    assert_eq!(
        failure.error.limit_violation(),
        Some(&LimitViolation::CallDepth { depth: 4, max: 3 })
    );
    assert!(probe.entries().is_empty());
}

#[tokio::test]
async fn test_self_call_rejected() {
    let probe = Probe::new();
    let repository = MapRepository::default()
        .with(procedure("a", vec![record("a-start"), call("a")]));
    let engine = engine_with(&probe, EngineConfig::default(), repository);

    let failure = engine.execute("a", json!({})).await.unwrap_err();

    assert!(matches!(
        failure.error.limit_violation(),
        Some(LimitViolation::CircularCall { procedure, .. }) if procedure == "a"
    ));
    assert_eq!(probe.entries(), ["a-start"]);
}

#[tokio::test]
async fn test_indirect_cycle_rejected_before_target_runs() {
    let probe = Probe::new();
    let repository = MapRepository::default()
        .with(procedure("a", vec![record("a-start"), call("b")]))
        .with(procedure("b", vec![record("b-start"), call("a")]));
    let engine = engine_with(&probe, EngineConfig::default(), repository);

    let failure = engine.execute("a", json!({})).await.unwrap_err();

    assert!(failure.error.is_fatal());
    assert!(failure.error.to_string().contains("call to 'b' failed"));
    assert_eq!(probe.entries(), ["a-start", "b-start"]);
}

#[tokio::test]
async fn test_failed_call_still_counts_child_commands() {
    let probe = Probe::new();
    let repository = MapRepository::default()
        .with(procedure("child", vec![record("c1"), record("c2"), fail("c3")]));
    let config = EngineConfig {
        max_commands: 5,
        ..EngineConfig::default()
    };
    let engine = engine_with(&probe, config, repository);
    // try(1) call(2) c1(3) c2(4) c3(5) -> caught; the next step is the 6th.
    let def = procedure(
        "parent",
        vec![
            Command::new("flow.try")
                .with_try(vec![call("child")])
                .with_catch(vec![]),
            record("after"),
        ],
    );

    let failure = engine
        .execute_definition(&def, json!({}), ExecutionOptions::default())
        .await
        .unwrap_err();

    assert_eq!(
        failure.error.limit_violation(),
        Some(&LimitViolation::Commands { max: 5 })
    );
    assert_eq!(probe.entries(), ["c1", "c2", "c3"]);
    // The child's trace was folded into the parent's before the error returned.
    assert!(failure.trace.iter().any(|e| e.step == "c3" && e.status == TraceStatus::Error));
}

#[tokio::test]
async fn test_missing_callee_is_recoverable() {
    let probe = Probe::new();
    let engine = engine(&probe);
    let def = procedure(
        "missing-callee",
        vec![call("ghost").optional(), record("after")],
    );

    let result = engine
        .execute_definition(&def, json!({}), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("'ghost' not found"));
    assert_eq!(probe.entries(), ["after"]);
}

#[tokio::test]
async fn test_callee_failure_is_annotated_with_callee_code() {
    let probe = Probe::new();
    let repository = MapRepository::default().with(procedure("child", vec![fail("boom")]));
    let engine = engine_with(&probe, EngineConfig::default(), repository);
    let def = procedure("parent", vec![call("child")]);

    let failure = engine
        .execute_definition(&def, json!({}), ExecutionOptions::default())
        .await
        .unwrap_err();

    match &failure.error {
        EngineError::Call { procedure, .. } => assert_eq!(procedure, "child"),
        other => panic!("expected call error, got {other:?}"),
    }
    assert_eq!(
        failure.error.to_string(),
        "call to 'child' failed: step 'boom' (probe.fail) failed: probe failure"
    );
}
