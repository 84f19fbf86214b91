//! End-to-end engine tests
//!
//! Exercises the activity pipeline, composite executors, control
//! predicates, caching, and the workflow driver against registered
//! actions.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use plait::{
    adapt, register, ActionMetadata, Activity, Binding, Control, ExecContext, OnError, OnExit,
    PlaitError, Statement, Workflow,
};
use serde_json::{json, Value};

fn binding_from(value: Value) -> Binding {
    match value {
        Value::Object(map) => map,
        _ => panic!("fixture must be an object"),
    }
}

fn register_writer(namespace: &str, name: &str, delta: Value) -> Arc<AtomicU32> {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_inner = Arc::clone(&calls);
    let action = adapt::<Value, Value, _, _>(
        move |_ctx, _args: Value| {
            let calls = Arc::clone(&calls_inner);
            let delta = delta.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(delta)
            }
        },
        ActionMetadata::new(namespace, name),
    )
    .unwrap();
    register(action).unwrap();
    calls
}

fn activity_node(namespace: &str, name: &str) -> Activity {
    Activity {
        namespace: namespace.to_string(),
        activity: name.to_string(),
        ..Activity::default()
    }
}

fn statement_for(activity: Activity, control: Control) -> Statement {
    Statement {
        control,
        activity: Some(activity),
        ..Statement::default()
    }
}

// ═══════════════════════════════════════════════════════════════
// ARG MERGE + TEMPLATED ARGUMENTS + RESPONSE SHAPING
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn activity_arg_merge_and_templated_arguments() {
    // Records each payload the action receives.
    let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_inner = Arc::clone(&seen);
    let action = adapt::<Value, Value, _, _>(
        move |_ctx, args: Value| {
            let seen = Arc::clone(&seen_inner);
            async move {
                seen.lock().push(args);
                Ok(json!("success"))
            }
        },
        ActionMetadata::new("scn2", "GetOrderName"),
    )
    .unwrap();
    register(action).unwrap();

    let activity = Activity {
        id: "act1".to_string(),
        namespace: "scn2".to_string(),
        activity: "GetOrderName".to_string(),
        args_force: binding_from(json!({"name": 5})),
        args_fallback: binding_from(json!({"age": 7})),
        arguments: "{{id}}".to_string(),
        responses: binding_from(json!({"name.ages": "{{name.age}}"})),
        ..Activity::default()
    };

    let input = binding_from(json!({
        "id": 678,
        "name": {"age": 55},
        "age": 8
    }));

    let ctx = ExecContext::root();
    let out = activity.execute(&ctx, &input).await.unwrap();

    // The templated payload reached the action as the string "678".
    assert_eq!(seen.lock().as_slice(), &[json!("678")]);

    // The shaped response landed under name.ages, resolved from the
    // original binding's nested value.
    assert_eq!(out["name"]["ages"], json!(55));

    // Fallback did not overwrite the existing age.
    assert_eq!(out["age"], json!(8));
    assert_eq!(out["id"], json!(678));

    // The id-scoped record keeps the raw request/response pair.
    assert_eq!(out["act1"]["arguments"], json!("678"));
    assert_eq!(out["act1"]["responses"], json!("success"));

    // The non-map result is also exposed under the composite key.
    assert_eq!(out["scn2/GetOrderName"], json!("success"));
}

// ═══════════════════════════════════════════════════════════════
// SEQUENCE EARLY EXIT
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn sequence_early_exit_detaches_the_tail() {
    let _ = register_writer("scn3", "First", json!({"first": 1}));
    let _ = register_writer("scn3", "Second", json!({"second": 2}));
    let third_calls = register_writer("scn3", "Third", json!({"third": 3}));

    let statement = Statement {
        sequence: Some(vec![
            statement_for(activity_node("scn3", "First"), Control::default()),
            statement_for(
                activity_node("scn3", "Second"),
                Control {
                    onexit: OnExit::Exit,
                    ..Control::default()
                },
            ),
            statement_for(activity_node("scn3", "Third"), Control::default()),
        ]),
        ..Statement::default()
    };

    let ctx = ExecContext::root();
    let out = statement.execute(&ctx, &Binding::new()).await.unwrap();

    // The caller sees the first two deltas and nothing from the tail.
    assert_eq!(out["first"], json!(1));
    assert_eq!(out["second"], json!(2));
    assert!(!out.contains_key("third"));

    // The tail executes fire-and-forget.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(third_calls.load(Ordering::SeqCst), 1);
}

// ═══════════════════════════════════════════════════════════════
// PARALLEL CANCELLATION
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn parallel_failure_cancels_the_running_sibling() {
    let fail = adapt::<Value, Value, _, _>(
        |_ctx, _args: Value| async move {
            Err::<Value, _>(PlaitError::Action("scn4 failure".to_string()))
        },
        ActionMetadata::new("scn4", "Fails"),
    )
    .unwrap();
    register(fail).unwrap();

    let hang = adapt::<Value, Value, _, _>(
        |ctx: ExecContext, _args: Value| async move {
            // Runs until the shared child scope is cancelled.
            ctx.done().await;
            Err::<Value, _>(PlaitError::Cancelled {
                operation: "sibling".to_string(),
            })
        },
        ActionMetadata::new("scn4", "Hangs"),
    )
    .unwrap();
    register(hang).unwrap();

    let statement = Statement {
        parallel: Some(vec![
            statement_for(activity_node("scn4", "Fails"), Control::default()),
            statement_for(activity_node("scn4", "Hangs"), Control::default()),
        ]),
        ..Statement::default()
    };

    let ctx = ExecContext::root();
    let err = statement.execute(&ctx, &Binding::new()).await.unwrap_err();

    match err {
        PlaitError::Multi(multi) => {
            assert_eq!(multi.len(), 2, "both children labelled: {}", multi);
            let labels: Vec<_> = multi
                .iter()
                .map(|e| match e {
                    PlaitError::ChildFailed { index, .. } => *index,
                    other => panic!("expected ChildFailed, got {:?}", other),
                })
                .collect();
            assert!(labels.contains(&0));
            assert!(labels.contains(&1));
        }
        other => panic!("expected Multi, got {:?}", other),
    }
}

// ═══════════════════════════════════════════════════════════════
// CACHED ACTIVITY
// ═══════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn cached_activity_skips_the_action_until_ttl() {
    let calls = register_writer("scn5", "Expensive", json!({"value": 41}));

    let activity = Activity {
        namespace: "scn5".to_string(),
        activity: "Expensive".to_string(),
        cached: true,
        ..Activity::default()
    };

    let input = binding_from(json!({"query": "q1"}));
    let ctx = ExecContext::root();

    let first = activity.execute(&ctx, &input).await.unwrap();
    assert_eq!(first["value"], json!(41));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Identical payload: served from the cache.
    let second = activity.execute(&ctx, &input).await.unwrap();
    assert_eq!(second["value"], json!(41));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A different payload misses.
    let other_input = binding_from(json!({"query": "q2"}));
    activity.execute(&ctx, &other_input).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Past the TTL the entry expires and the action runs again.
    tokio::time::advance(Duration::from_secs(6 * 60)).await;
    let third = activity.execute(&ctx, &input).await.unwrap();
    assert_eq!(third["value"], json!(41));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn uncached_activity_always_invokes() {
    let calls = register_writer("scn5", "Uncached", json!({"n": 1}));

    let activity = activity_node("scn5", "Uncached");
    let input = binding_from(json!({"query": "same"}));
    let ctx = ExecContext::root();

    activity.execute(&ctx, &input).await.unwrap();
    activity.execute(&ctx, &input).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ═══════════════════════════════════════════════════════════════
// WHEN PREDICATE WITH DEPENDENCY
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn when_predicate_gates_on_dependency_output() {
    let _ = register_writer("scn6", "WritesHigh", json!({"x": 5}));
    let _ = register_writer("scn6", "WritesLow", json!({"x": 1}));
    let body_calls = register_writer("scn6", "Body", json!({"ran": true}));

    let gated = |dep: &str| {
        statement_for(
            activity_node("scn6", "Body"),
            Control {
                when: "{{x}} > 3".to_string(),
                depends_on: vec![activity_node("scn6", dep)],
                ..Control::default()
            },
        )
    };

    let input = binding_from(json!({"seed": true}));
    let ctx = ExecContext::root();

    // Dependency writes x = 5: the sub-node executes.
    let out = gated("WritesHigh").execute(&ctx, &input).await.unwrap();
    assert_eq!(out["ran"], json!(true));
    assert_eq!(body_calls.load(Ordering::SeqCst), 1);

    // Dependency writes x = 1: input comes back verbatim.
    let out = gated("WritesLow").execute(&ctx, &input).await.unwrap();
    assert_eq!(out, input);
    assert_eq!(body_calls.load(Ordering::SeqCst), 1);
}

// ═══════════════════════════════════════════════════════════════
// FULL WORKFLOW DRIVE
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn workflow_threads_variables_root_and_responses() {
    let _ = register_writer("wf-e2e", "Enrich", json!({"enriched": true}));

    let workflow = Workflow {
        variables: binding_from(json!({"region": "eu"})),
        root: Statement {
            sequence: Some(vec![statement_for(
                activity_node("wf-e2e", "Enrich"),
                Control::default(),
            )]),
            ..Statement::default()
        },
        responses: binding_from(json!({"summary.state": "done"})),
    };

    let ctx = ExecContext::root();
    let input = binding_from(json!({"order": 9}));
    let out = workflow.execute(&ctx, &input).await.unwrap();

    assert_eq!(out["order"], json!(9));
    assert_eq!(out["region"], json!("eu"));
    assert_eq!(out["enriched"], json!(true));
    assert_eq!(out["summary"]["state"], json!("done"));
}

#[tokio::test]
async fn sequence_ignores_failures_when_asked() {
    let _ = register_writer("wf-ign", "Good", json!({"good": 1}));
    let fail = adapt::<Value, Value, _, _>(
        |_ctx, _args: Value| async move {
            Err::<Value, _>(PlaitError::Action("ignored".to_string()))
        },
        ActionMetadata::new("wf-ign", "Bad"),
    )
    .unwrap();
    register(fail).unwrap();

    let statement = Statement {
        sequence: Some(vec![
            statement_for(
                activity_node("wf-ign", "Bad"),
                Control {
                    onerror: OnError::Ignore,
                    ..Control::default()
                },
            ),
            statement_for(activity_node("wf-ign", "Good"), Control::default()),
        ]),
        ..Statement::default()
    };

    let ctx = ExecContext::root();
    let out = statement.execute(&ctx, &Binding::new()).await.unwrap();
    assert_eq!(out["good"], json!(1));
}

// ═══════════════════════════════════════════════════════════════
// TIMEOUT CLASSIFICATION
// ═══════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn activity_timeout_is_a_timeout_kind() {
    let slow = adapt::<Value, Value, _, _>(
        |_ctx, _args: Value| async move {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok(json!({"late": true}))
        },
        ActionMetadata::new("wf-timeout", "Slow"),
    )
    .unwrap();
    register(slow).unwrap();

    let activity = Activity {
        namespace: "wf-timeout".to_string(),
        activity: "Slow".to_string(),
        timeout: 1,
        ..Activity::default()
    };

    let ctx = ExecContext::root();
    let err = activity.execute(&ctx, &Binding::new()).await.unwrap_err();
    assert!(err.is_timeout());

    // The parent context is unaffected by the expired activity scope.
    assert!(!ctx.is_cancelled());
}
