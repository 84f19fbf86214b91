//! Actions - registered operations invoked by workflow activities
//!
//! An action is an async callable with a stable `(namespace, activity)`
//! key and declarative metadata: the argument shape it accepts, the
//! argument keys it requires, and the response fields it promises.
//! [`ActionMetadata::execute`] validates both sides of that contract
//! around a registry-resolved invocation.

pub mod adapter;
pub mod registry;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::binding::{self, path};
use crate::context::ExecContext;
use crate::error::{PlaitError, Result};

/// Composite action key: the activity name alone when the namespace is
/// empty, else `namespace/activity`.
pub fn action_key(namespace: &str, activity: &str) -> String {
    if namespace.is_empty() {
        activity.to_string()
    } else {
        format!("{}/{}", namespace, activity)
    }
}

/// A registered operation.
///
/// Implementations are usually produced by [`adapter::adapt`], which wraps
/// a typed callable; hand-written implementations only need the two
/// methods.
#[async_trait]
pub trait Action: Send + Sync {
    /// Declarative properties of this action.
    fn metadata(&self) -> &ActionMetadata;

    /// Invoke with dynamically-typed arguments.
    async fn execute(&self, ctx: &ExecContext, args: Value) -> Result<Value>;
}

impl fmt::Debug for dyn Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("dyn Action")
            .field("metadata", self.metadata())
            .finish()
    }
}

/// Whether an action queries (no side effects) or updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    #[default]
    Query,
    Update,
}

/// Declared shape of a response field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReturnField {
    /// Field name, a dotted path into the serialized result.
    pub name: String,
    /// Field type label (e.g. "string", "int") - documentation only.
    #[serde(rename = "type")]
    pub kind: String,
    /// Whether the field must be present in the result.
    pub required: bool,
    pub description: String,
}

/// A coercion capability standing in for a declared argument type.
///
/// Carries the Rust type's name for error messages and a conversion that
/// round-trips a dynamic value through the declared shape.
#[derive(Clone)]
pub struct ArgumentType {
    name: &'static str,
    coerce: Arc<dyn Fn(&Value) -> std::result::Result<Value, String> + Send + Sync>,
}

impl ArgumentType {
    /// Build the capability for a concrete Rust type.
    pub fn of<I>() -> Self
    where
        I: DeserializeOwned + Serialize + 'static,
    {
        Self {
            name: std::any::type_name::<I>(),
            coerce: Arc::new(|value| {
                let typed: I = adapter::coerce_value(value)?;
                serde_json::to_value(typed).map_err(|e| e.to_string())
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Convert a value through the declared shape, normalizing it.
    pub fn coerce(&self, value: &Value) -> std::result::Result<Value, String> {
        (self.coerce)(value)
    }
}

impl fmt::Debug for ArgumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentType")
            .field("name", &self.name)
            .finish()
    }
}

/// Declarative properties of one action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionMetadata {
    pub kind: ActionKind,
    pub namespace: String,
    /// Activity name; must be non-empty to register.
    pub activity: String,
    pub description: String,
    /// Dotted paths that must exist in the serialized argument.
    pub required_argument_keys: Vec<String>,
    /// Declared argument shape; populated from the callable's input type
    /// during adaptation when unset.
    #[serde(skip)]
    pub argument_type: Option<ArgumentType>,
    /// Response-field contract checked after every guarded invocation.
    pub responses: Vec<ReturnField>,
}

impl ActionMetadata {
    pub fn new(namespace: impl Into<String>, activity: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            activity: activity.into(),
            ..Self::default()
        }
    }

    pub fn key(&self) -> String {
        action_key(&self.namespace, &self.activity)
    }

    /// Validate arguments, resolve the action, invoke it, and validate the
    /// response contract.
    ///
    /// Stage order: argument-type coercion, required-key presence,
    /// registry lookup, invocation, required-response presence. The
    /// coerced argument is forwarded only when coercion succeeds.
    pub async fn execute(&self, ctx: &ExecContext, args: Value) -> Result<Value> {
        if self.activity.is_empty() {
            return Err(PlaitError::ActivityNameEmpty);
        }

        let args = match &self.argument_type {
            Some(argument_type) => {
                argument_type
                    .coerce(&args)
                    .map_err(|reason| PlaitError::BadArguments {
                        reason: format!(
                            "not coercible to {}: {}",
                            argument_type.name(),
                            reason
                        ),
                    })?
            }
            None => args,
        };

        let missing = self.missing_required_keys(&args);
        if !missing.is_empty() {
            return Err(PlaitError::MissingArguments { keys: missing });
        }

        let action = registry::lookup(&self.namespace, &self.activity)?;

        let result = action
            .execute(ctx, args)
            .await
            .map_err(|e| PlaitError::ActionFailed {
                key: self.key(),
                source: Box::new(e),
            })?;

        let missing = self.missing_required_responses(&result);
        if !missing.is_empty() {
            return Err(PlaitError::BadResponse {
                missing,
                raw: binding::to_text(&result),
            });
        }

        Ok(result)
    }

    /// Required argument keys absent from the serialized argument.
    pub fn missing_required_keys(&self, args: &Value) -> Vec<String> {
        if self.required_argument_keys.is_empty() {
            return Vec::new();
        }
        let view = binding::normalize(args);
        self.required_argument_keys
            .iter()
            .filter(|key| !path::exists(&view, key))
            .cloned()
            .collect()
    }

    /// Required response fields absent from the serialized result.
    pub fn missing_required_responses(&self, result: &Value) -> Vec<String> {
        if self.responses.is_empty() {
            return Vec::new();
        }
        let view = binding::normalize(result);
        self.responses
            .iter()
            .filter(|field| field.required && !field.name.is_empty())
            .filter(|field| !path::exists(&view, &field.name))
            .map(|field| field.name.clone())
            .collect()
    }
}
