//! # Plait
//!
//! Declarative workflow engine: a workflow is a static tree of control
//! nodes ("statements") that, executed with an input binding, threads a
//! variable map through sequential, parallel, and conditional steps and
//! invokes side-effecting operations ("actions") registered in a
//! process-wide catalog.
//!
//! ## Architecture
//!
//! | Component | Module | Description |
//! |-----------|--------|-------------|
//! | Action registry | [`action::registry`] | `(namespace, activity)` → action catalog |
//! | Action metadata | [`action`] | Argument/response contract validation |
//! | Typed adapter | [`action::adapter`] | Typed callable → dynamic action |
//! | Activity | [`ast`] + [`runtime::activity`] | Param shaping, cache, hooks, retry, timeout |
//! | Sequence / Parallel | [`runtime`] | Serial and concurrent composition |
//! | Statement / Control | [`runtime::statement`] | Guarded union node |
//! | Workflow | [`runtime::workflow`] | Top-level driver |
//! | Binding | [`binding`] | The variable map, dotted paths, `{{path}}` templates |
//! | Rule engine | [`rule`] | `when` predicate evaluation |
//! | TTL cache | [`cache`] | Response cache (5 min TTL, 10 min sweep) |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use plait::{adapt, register, ActionMetadata, Activity, ExecContext, Statement, Workflow};
//! use serde_json::json;
//!
//! # async fn demo() -> plait::Result<()> {
//! // Register a typed action under the process-wide catalog.
//! let action = adapt::<i64, String, _, _>(
//!     |_ctx, id| async move { Ok(format!("order-{id}")) },
//!     ActionMetadata::new("orders", "GetOrderName"),
//! )?;
//! register(action)?;
//!
//! // Describe the plan (usually deserialized from YAML).
//! let workflow = Workflow {
//!     root: Statement {
//!         activity: Some(Activity {
//!             namespace: "orders".into(),
//!             activity: "GetOrderName".into(),
//!             arguments: "{{id}}".into(),
//!             ..Activity::default()
//!         }),
//!         ..Statement::default()
//!     },
//!     ..Workflow::default()
//! };
//!
//! // Execute with an input binding.
//! let ctx = ExecContext::root();
//! let input = plait::binding::create_map(&json!({"id": 678}));
//! let out = workflow.execute(&ctx, &input).await?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod ast;
pub mod binding;
pub mod cache;
pub mod context;
pub mod error;
pub mod rule;
pub mod runtime;

// Re-export the main types at the crate root.
pub use action::adapter::adapt;
pub use action::registry::{all_actions, lookup, register};
pub use action::{action_key, Action, ActionKind, ActionMetadata, ArgumentType, ReturnField};
pub use ast::{
    Activity, ActivityRef, Control, DependsOn, HookEvent, LifecycleHooks, NodeKind, OnError,
    OnExit, RetryPolicy, Statement, Workflow,
};
pub use binding::{Binding, clone_binding, create_map};
pub use cache::{activity_cache, TtlCache, ACTIVITY_CACHE_SWEEP, ACTIVITY_CACHE_TTL};
pub use context::ExecContext;
pub use error::{FixSuggestion, MultiError, PlaitError, Result};
