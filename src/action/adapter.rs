//! Typed-callable adapter
//!
//! Wraps a statically typed `Fn(ExecContext, I) -> Future<Result<O>>` into
//! the dynamic [`Action`] shape. Incoming values are coerced to `I` through
//! serde; results are coerced back to `O`'s nominal JSON shape.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::binding::value_kind;
use crate::context::ExecContext;
use crate::error::{PlaitError, Result};

use super::{Action, ActionMetadata, ArgumentType};

/// Coerce a dynamic value into a declared Rust shape.
///
/// Direct deserialization first; a string that fails is reparsed as JSON
/// text, and as a last resort a scalar is retried through its textual
/// form. This is the "serialize to text, parse into declared shape"
/// pipeline that makes `"7"` usable where an `i64` is declared.
pub fn coerce_value<I: DeserializeOwned>(value: &Value) -> std::result::Result<I, String> {
    match serde_json::from_value::<I>(value.clone()) {
        Ok(typed) => Ok(typed),
        Err(direct_err) => {
            if let Value::String(text) = value {
                if let Ok(reparsed) = serde_json::from_str::<Value>(text) {
                    if let Ok(typed) = serde_json::from_value::<I>(reparsed) {
                        return Ok(typed);
                    }
                }
            } else if !value.is_object() && !value.is_array() {
                let text = crate::binding::to_text(value);
                if let Ok(typed) = serde_json::from_value::<I>(Value::String(text)) {
                    return Ok(typed);
                }
            }
            Err(direct_err.to_string())
        }
    }
}

type DynCallable<I, O> =
    Arc<dyn Fn(ExecContext, I) -> BoxFuture<'static, Result<O>> + Send + Sync>;

/// An [`Action`] backed by a typed callable.
struct FnAction<I, O> {
    metadata: ActionMetadata,
    callable: DynCallable<I, O>,
    _types: PhantomData<fn(I) -> O>,
}

#[async_trait]
impl<I, O> Action for FnAction<I, O>
where
    I: DeserializeOwned + Serialize + Send + Sync + 'static,
    O: DeserializeOwned + Serialize + Send + Sync + 'static,
{
    fn metadata(&self) -> &ActionMetadata {
        &self.metadata
    }

    async fn execute(&self, ctx: &ExecContext, args: Value) -> Result<Value> {
        let input: I = coerce_value(&args).map_err(|_| PlaitError::TypeMismatch {
            expected: std::any::type_name::<I>().to_string(),
            actual: value_kind(&args).to_string(),
        })?;

        let output: O = (self.callable)(ctx.clone(), input).await?;

        serde_json::to_value(output).map_err(PlaitError::from)
    }
}

/// Adapt a typed callable into a registrable action.
///
/// Fails when the metadata carries no activity name. When
/// `metadata.argument_type` is unset it is populated from `I`, so the
/// metadata-guarded execution path coerces arguments the same way the
/// adapter itself does.
pub fn adapt<I, O, F, Fut>(callable: F, mut metadata: ActionMetadata) -> Result<Arc<dyn Action>>
where
    I: DeserializeOwned + Serialize + Send + Sync + 'static,
    O: DeserializeOwned + Serialize + Send + Sync + 'static,
    F: Fn(ExecContext, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    if metadata.activity.is_empty() {
        return Err(PlaitError::ActivityNameEmpty);
    }
    if metadata.argument_type.is_none() {
        metadata.argument_type = Some(ArgumentType::of::<I>());
    }

    let callable: DynCallable<I, O> = Arc::new(move |ctx, input| Box::pin(callable(ctx, input)));

    Ok(Arc::new(FnAction {
        metadata,
        callable,
        _types: PhantomData,
    }))
}
