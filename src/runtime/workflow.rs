//! Workflow execution - the top-level driver
//!
//! Seeds the caller-supplied input with fallback variables, runs the root
//! statement, and force-overlays the configured response map onto the
//! final binding.

use tracing::{debug, instrument};

use crate::ast::Workflow;
use crate::binding::{self, path, path::Policy, Binding};
use crate::context::ExecContext;
use crate::error::{PlaitError, Result};

impl Workflow {
    /// Execute the plan against an input binding.
    #[instrument(skip_all, fields(variables = self.variables.len()))]
    pub async fn execute(&self, ctx: &ExecContext, args: &Binding) -> Result<Binding> {
        let input = if self.variables.is_empty() {
            binding::clone_binding(args)
        } else {
            path::apply_defaults(args, &self.variables, Policy::Fallback)
        };

        debug!("executing workflow root");
        let out = self
            .root
            .execute(ctx, &input)
            .await
            .map_err(|e| PlaitError::WorkflowFailed {
                source: Box::new(e),
            })?;

        if self.responses.is_empty() {
            Ok(out)
        } else {
            Ok(path::apply_defaults(&out, &self.responses, Policy::Force))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::adapter::adapt;
    use crate::action::{registry, ActionMetadata};
    use crate::ast::{Activity, Statement};
    use serde_json::{json, Value};

    fn register_writer(name: &str, delta: Value) {
        let action = adapt::<Value, Value, _, _>(
            move |_ctx, _args: Value| {
                let delta = delta.clone();
                async move { Ok(delta) }
            },
            ActionMetadata::new("workflow-test", name),
        )
        .unwrap();
        registry::register(action).unwrap();
    }

    fn workflow_running(name: &str) -> Workflow {
        Workflow {
            root: Statement {
                activity: Some(Activity {
                    namespace: "workflow-test".to_string(),
                    activity: name.to_string(),
                    ..Activity::default()
                }),
                ..Statement::default()
            },
            ..Workflow::default()
        }
    }

    #[tokio::test]
    async fn variables_fallback_merge_into_input() {
        register_writer("VarProbe", json!({}));

        let mut workflow = workflow_running("VarProbe");
        workflow.variables = crate::binding::create_map(&json!({"region": "eu", "id": 1}));

        let args = crate::binding::create_map(&json!({"id": 42}));
        let ctx = ExecContext::root();
        let out = workflow.execute(&ctx, &args).await.unwrap();

        // Caller-supplied input wins over workflow variables.
        assert_eq!(out["id"], json!(42));
        assert_eq!(out["region"], json!("eu"));
    }

    #[tokio::test]
    async fn responses_force_overlay_the_final_binding() {
        register_writer("RespProbe", json!({"status": "raw"}));

        let mut workflow = workflow_running("RespProbe");
        workflow.responses = crate::binding::create_map(&json!({
            "status": "done",
            "report.total": 3
        }));

        let ctx = ExecContext::root();
        let out = workflow.execute(&ctx, &Binding::new()).await.unwrap();
        assert_eq!(out["status"], json!("done"));
        assert_eq!(out["report"]["total"], json!(3));
    }

    #[tokio::test]
    async fn root_errors_are_wrapped() {
        let workflow = workflow_running("WorkflowNeverRegistered");
        let ctx = ExecContext::root();
        let err = workflow.execute(&ctx, &Binding::new()).await.unwrap_err();
        match err {
            PlaitError::WorkflowFailed { source } => {
                assert!(matches!(*source, PlaitError::NotRegistered { .. }));
            }
            other => panic!("expected WorkflowFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_root_passes_input_through() {
        let workflow = Workflow::default();
        let args = crate::binding::create_map(&json!({"echo": true}));
        let ctx = ExecContext::root();
        let out = workflow.execute(&ctx, &args).await.unwrap();
        assert_eq!(out, args);
    }
}
