//! Parallel execution - concurrent fan-out
//!
//! One worker per child under a shared child cancellation scope. Delta
//! merges are serialized by a mutex; merge order between concurrent
//! children is unspecified. The first non-ignored failure cancels the
//! scope so running siblings observe cancellation, and every failure
//! lands in the returned multi-error.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::warn;

use crate::ast::Statement;
use crate::binding::{self, Binding};
use crate::context::ExecContext;
use crate::error::{MultiError, PlaitError, Result};

/// Run child statements concurrently, each against its own clone of the
/// input binding. The parent waits for every worker.
pub async fn execute_parallel(
    children: &[Statement],
    ctx: &ExecContext,
    binding: &Binding,
) -> Result<Binding> {
    let result = Arc::new(Mutex::new(binding::clone_binding(binding)));
    let errors = Arc::new(Mutex::new(MultiError::new()));
    let scope = ctx.child();

    let mut workers = JoinSet::new();

    for (index, statement) in children.iter().enumerate() {
        let statement = statement.clone();
        let scope = scope.clone();
        let parent = ctx.clone();
        let result = Arc::clone(&result);
        let errors = Arc::clone(&errors);
        let vars = binding::clone_binding(binding);

        workers.spawn(async move {
            // A worker that never started still reports cancellation.
            if parent.is_cancelled() || scope.is_cancelled() {
                errors.lock().push(PlaitError::ChildFailed {
                    index,
                    source: Box::new(PlaitError::Cancelled {
                        operation: "parallel".to_string(),
                    }),
                });
                return;
            }

            match statement.execute(&scope, &vars).await {
                Ok(delta) => {
                    let mut merged = result.lock();
                    let updated = binding::assign_all(&[&*merged, &delta]);
                    *merged = updated;
                }
                Err(e) => {
                    if statement.control.ignores_errors() {
                        warn!(child = index, error = %e, "parallel child failed, ignored");
                        return;
                    }
                    // Siblings observe the cancellation and report in.
                    scope.cancel();
                    errors.lock().push(PlaitError::ChildFailed {
                        index,
                        source: Box::new(e),
                    });
                }
            }
        });
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            errors.lock().push(PlaitError::WorkerPanic {
                reason: e.to_string(),
            });
        }
    }

    let errors = Arc::try_unwrap(errors)
        .map(Mutex::into_inner)
        .unwrap_or_default();
    errors.into_result()?;

    let merged = Arc::try_unwrap(result)
        .map(Mutex::into_inner)
        .unwrap_or_default();
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::adapter::adapt;
    use crate::action::{registry, ActionMetadata};
    use crate::ast::{Activity, Control, OnError};
    use serde_json::{json, Value};

    fn statement_for(name: &str, control: Control) -> Statement {
        Statement {
            control,
            activity: Some(Activity {
                namespace: "parallel-test".to_string(),
                activity: name.to_string(),
                ..Activity::default()
            }),
            ..Statement::default()
        }
    }

    fn register_writer(name: &str, delta: Value) {
        let action = adapt::<Value, Value, _, _>(
            move |_ctx, _args: Value| {
                let delta = delta.clone();
                async move { Ok(delta) }
            },
            ActionMetadata::new("parallel-test", name),
        )
        .unwrap();
        registry::register(action).unwrap();
    }

    #[tokio::test]
    async fn disjoint_deltas_union() {
        register_writer("WriteX", json!({"x": 1}));
        register_writer("WriteY", json!({"y": 2}));

        let children = vec![
            statement_for("WriteX", Control::default()),
            statement_for("WriteY", Control::default()),
        ];

        let ctx = ExecContext::root();
        let out = execute_parallel(&children, &ctx, &Binding::new()).await.unwrap();
        assert_eq!(out["x"], json!(1));
        assert_eq!(out["y"], json!(2));
    }

    #[tokio::test]
    async fn failure_cancels_running_siblings() {
        let fail = adapt::<Value, Value, _, _>(
            |_ctx, _args: Value| async move {
                Err::<Value, _>(PlaitError::Action("first failure".to_string()))
            },
            ActionMetadata::new("parallel-test", "FailFast"),
        )
        .unwrap();
        registry::register(fail).unwrap();

        // Never resolves on its own; only the scope cancellation ends it.
        let hang = adapt::<Value, Value, _, _>(
            |ctx: ExecContext, _args: Value| async move {
                ctx.done().await;
                Err::<Value, _>(PlaitError::Cancelled {
                    operation: "hanging sibling".to_string(),
                })
            },
            ActionMetadata::new("parallel-test", "HangUntilCancelled"),
        )
        .unwrap();
        registry::register(hang).unwrap();

        let children = vec![
            statement_for("FailFast", Control::default()),
            statement_for("HangUntilCancelled", Control::default()),
        ];

        let ctx = ExecContext::root();
        let err = execute_parallel(&children, &ctx, &Binding::new())
            .await
            .unwrap_err();

        match err {
            PlaitError::Multi(multi) => {
                assert_eq!(multi.len(), 2, "both children report: {}", multi);
                assert!(multi.iter().any(|e| e.is_cancelled()));
            }
            other => panic!("expected Multi, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn ignored_failure_is_dropped() {
        register_writer("IgnoredSibling", json!({"ok": 1}));
        let fail = adapt::<Value, Value, _, _>(
            |_ctx, _args: Value| async move {
                Err::<Value, _>(PlaitError::Action("soft".to_string()))
            },
            ActionMetadata::new("parallel-test", "SoftFail"),
        )
        .unwrap();
        registry::register(fail).unwrap();

        let children = vec![
            statement_for(
                "SoftFail",
                Control {
                    onerror: OnError::Ignore,
                    ..Control::default()
                },
            ),
            statement_for("IgnoredSibling", Control::default()),
        ];

        let ctx = ExecContext::root();
        let out = execute_parallel(&children, &ctx, &Binding::new()).await.unwrap();
        assert_eq!(out["ok"], json!(1));
    }

    #[tokio::test]
    async fn cancelled_parent_reports_without_executing() {
        register_writer("NeverStarted", json!({"late": 1}));

        let ctx = ExecContext::root();
        ctx.cancel();

        let children = vec![statement_for("NeverStarted", Control::default())];
        let err = execute_parallel(&children, &ctx, &Binding::new())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn workers_see_their_own_binding_clones() {
        register_writer("CloneA", json!({"a": 1}));
        register_writer("CloneB", json!({"b": 2}));

        let children = vec![
            statement_for("CloneA", Control::default()),
            statement_for("CloneB", Control::default()),
        ];

        let mut input = Binding::new();
        input.insert("seed".to_string(), json!(0));

        let ctx = ExecContext::root();
        let out = execute_parallel(&children, &ctx, &input).await.unwrap();
        assert_eq!(out["seed"], json!(0));
        assert_eq!(out["a"], json!(1));
        assert_eq!(out["b"], json!(2));
    }
}
