//! Activity execution - the critical path
//!
//! Pipeline: shape the input (id hoist, fallback/force defaults), scope
//! the context, run dependencies, synthesize the payload, dispatch the
//! action (cache, hooks, retry, timeout), then shape the response back
//! into the binding.

use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use crate::action::{action_key, registry, Action};
use crate::ast::{Activity, DependsOn, HookEvent, LifecycleHooks};
use crate::binding::{self, path, path::Policy, template, Binding, ARGUMENTS_KEY, RESPONSES_KEY};
use crate::cache;
use crate::context::ExecContext;
use crate::error::{PlaitError, Result};
use crate::runtime::execute_sequence;

/// Backoff before the second attempt when the policy leaves it unset.
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

impl Activity {
    /// Run this node against a binding, returning the updated binding.
    pub fn execute<'a>(
        &'a self,
        ctx: &'a ExecContext,
        binding: &'a Binding,
    ) -> BoxFuture<'a, Result<Binding>> {
        Box::pin(self.execute_inner(ctx, binding))
    }

    async fn execute_inner(&self, ctx: &ExecContext, binding: &Binding) -> Result<Binding> {
        let input = self.make_input(binding);

        // The deadline scope ends when this call returns, on every path.
        let exec_ctx = if self.timeout > 0 {
            ctx.with_timeout(Duration::from_secs(self.timeout))
        } else {
            ctx.clone()
        };

        let deps = self
            .run_depends_on(&exec_ctx, &input)
            .await
            .map_err(|e| PlaitError::DependencyFailed {
                id: self.display_id(),
                source: Box::new(e),
            })?;

        let payload: Value = if self.arguments.is_empty() {
            Value::Object(binding::clone_binding(&deps))
        } else {
            Value::String(template::render(&self.arguments, &deps).into_owned())
        };

        let raw = self.dispatch(&exec_ctx, &payload).await?;

        let scoped = self.create_response(&payload, &raw);
        if self.responses.is_empty() {
            return Ok(binding::assign_all(&[&input, &deps, binding, &scoped]));
        }

        let merged = binding::assign_all(&[&input, &deps, binding, &scoped]);
        let rendered = template::render_map(&self.responses, &merged);
        let shaped = path::apply_defaults(&scoped, &rendered, Policy::Force);
        // Second pass: values lifted out of the raw result may themselves
        // carry placeholders.
        let shaped = template::render_map(&shaped, &merged);

        Ok(binding::assign_all(&[&input, &deps, binding, &shaped]))
    }

    /// Clone the binding, hoist the id-scoped entries, apply defaults.
    fn make_input(&self, binding: &Binding) -> Binding {
        let mut input = binding::clone_binding(binding);

        if !self.id.is_empty() {
            if let Some(Value::Object(scoped)) = input.get(&self.id).cloned() {
                for (k, v) in scoped {
                    input.insert(k, v);
                }
            }
        }

        if !self.args_fallback.is_empty() {
            input = path::apply_defaults(&input, &self.args_fallback, Policy::Fallback);
        }
        if !self.args_force.is_empty() {
            input = path::apply_defaults(&input, &self.args_force, Policy::Force);
        }
        input
    }

    async fn run_depends_on(&self, ctx: &ExecContext, input: &Binding) -> Result<Binding> {
        match &self.depends_on {
            None => Ok(binding::clone_binding(input)),
            Some(DependsOn::Statements(statements)) => {
                execute_sequence(statements, ctx, input).await
            }
            Some(DependsOn::Actions(_)) => Err(PlaitError::NotImplemented {
                feature: "depends_on as action references".to_string(),
                suggestion: "Use depends_on.statements instead".to_string(),
            }),
        }
    }

    /// Cached dispatch: cache short-circuit, registry lookup, then the
    /// hooked invocation under the retry policy.
    async fn dispatch(&self, ctx: &ExecContext, payload: &Value) -> Result<Value> {
        let key = action_key(&self.namespace, &self.activity);

        let cache_key = self
            .cached
            .then(|| format!("{:x}", md5::compute(binding::to_text(payload))));
        if let Some(ck) = &cache_key {
            if let Some(hit) = cache::activity_cache().get(&key, ck) {
                debug!(action = %key, "activity cache hit");
                return Ok(hit);
            }
        }

        let action = registry::lookup(&self.namespace, &self.activity)?;

        let result = self
            .invoke_with_retry(ctx, action.as_ref(), payload, &key)
            .await
            .map_err(|e| PlaitError::ActionFailed {
                key: key.clone(),
                source: Box::new(e),
            })?;

        if let Some(ck) = &cache_key {
            cache::activity_cache().set(&key, ck, result.clone());
        }

        Ok(result)
    }

    /// First success or last error. Policy 0 means exactly one try; the
    /// backoff doubles per attempt and never sleeps on a dead scope.
    async fn invoke_with_retry(
        &self,
        ctx: &ExecContext,
        action: &dyn Action,
        payload: &Value,
        key: &str,
    ) -> Result<Value> {
        let attempts = self.retry_policy.maximum_attempts + 1;
        let initial = self
            .retry_policy
            .initial_interval
            .unwrap_or(DEFAULT_RETRY_INTERVAL);

        let mut last_err = None;
        for attempt in 1..=attempts {
            ctx.check(key)?;

            let outcome = if self.hooks.is_empty() {
                ctx.run(key, action.execute(ctx, payload.clone())).await
            } else {
                self.hooks.run(ctx, action, payload, key).await
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt < attempts {
                        let backoff = initial * 2u32.pow(attempt - 1);
                        debug!(
                            action = key,
                            attempt,
                            max = attempts,
                            ?backoff,
                            error = %e,
                            "action failed, retrying"
                        );
                        last_err = Some(e);
                        ctx.sleep(backoff, key).await?;
                    } else {
                        last_err = Some(e);
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| PlaitError::Action("no attempts executed".to_string())))
    }

    /// Base result shape: payload overlaid with the raw result, a non-map
    /// result exposed under the composite action key, and an id-scoped
    /// `{id: {arguments, responses}}` record.
    fn create_response(&self, payload: &Value, raw: &Value) -> Binding {
        let mut result = binding::create_map(payload);

        let mut raw_map = binding::create_map(raw);
        if raw_map.is_empty() {
            raw_map.insert(
                action_key(&self.namespace, &self.activity),
                raw.clone(),
            );
        }
        binding::assign(&mut result, &raw_map);

        if !self.id.is_empty() {
            let mut scoped = Binding::new();
            scoped.insert(ARGUMENTS_KEY.to_string(), payload.clone());
            scoped.insert(RESPONSES_KEY.to_string(), raw.clone());
            result.insert(self.id.clone(), Value::Object(scoped));
        }

        result
    }
}

impl LifecycleHooks {
    /// Wrap an invocation with start/success/error/timeout/complete
    /// observers. Hook outcomes never alter the action's result.
    pub(crate) async fn run(
        &self,
        ctx: &ExecContext,
        action: &dyn Action,
        payload: &Value,
        operation: &str,
    ) -> Result<Value> {
        self.fire(HookEvent::Start, payload).await;

        let outcome = ctx
            .run(operation, action.execute(ctx, payload.clone()))
            .await;

        match &outcome {
            Err(e) if e.is_timeout() || ctx.deadline_exceeded() => {
                self.fire(HookEvent::Timeout, payload).await;
            }
            Err(_) => self.fire(HookEvent::Error, payload).await,
            Ok(_) => self.fire(HookEvent::Success, payload).await,
        }

        self.fire(HookEvent::Complete, payload).await;
        outcome
    }

    /// Observers run on a fresh root scope so a spent deadline cannot
    /// starve the timeout hook itself.
    async fn fire(&self, event: HookEvent, payload: &Value) {
        let Some(hook) = self.get(event) else {
            return;
        };
        let scope = ExecContext::root();
        let view = binding::create_map(payload);
        if let Err(e) = hook.execute(&scope, &view).await {
            warn!(hook = %event, error = %e, "lifecycle hook failed");
        }
    }
}

/// Compute the cache key an activity would use for a payload. Exposed for
/// tests that pre-seed or inspect the response cache.
pub fn payload_cache_key(payload: &Value) -> String {
    format!("{:x}", md5::compute(binding::to_text(payload)))
}
