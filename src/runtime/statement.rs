//! Statement and control evaluation
//!
//! A statement first evaluates its control's predicate (running the
//! control's dependency activities to feed it), then resolves which of
//! its populated sub-nodes to run via the execution-order preference, and
//! executes exactly that one.

use futures::future::BoxFuture;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::ast::{Control, NodeKind, Statement};
use crate::binding::{self, template, Binding};
use crate::context::ExecContext;
use crate::error::{PlaitError, Result};
use crate::rule;
use crate::runtime::{execute_parallel, execute_sequence};

impl Control {
    /// Evaluate the `when` predicate. Empty means execute.
    ///
    /// Dependency activities run in order, each delta merging into the
    /// view the expression interpolates against; the rule engine then
    /// sees the interpolated string plus the original binding.
    pub(crate) async fn predicate(&self, ctx: &ExecContext, binding: &Binding) -> Result<bool> {
        if self.when.is_empty() {
            return Ok(true);
        }

        let mut view = binding::clone_binding(binding);
        for activity in &self.depends_on {
            let delta = activity.execute(ctx, &view).await.map_err(|e| {
                PlaitError::DependencyFailed {
                    id: activity.display_id(),
                    source: Box::new(e),
                }
            })?;
            binding::assign(&mut view, &delta);
        }

        let rendered = template::render(&self.when, &view);
        debug!(predicate = %rendered, "evaluating when predicate");
        rule::evaluate_predicate(&rendered, binding)
    }

    /// Rank the statement's populated sub-node kinds.
    ///
    /// Defaults: activity < sequence < parallel. Kinds listed in
    /// `execution_order` take their 1-based index as rank instead. The
    /// evaluator consumes only the head of the returned list.
    pub fn resolve_order(&self, statement: &Statement) -> Vec<NodeKind> {
        let default_rank: FxHashMap<NodeKind, usize> = [
            (NodeKind::Activity, 1),
            (NodeKind::Sequence, 2),
            (NodeKind::Parallel, 3),
        ]
        .into_iter()
        .collect();

        let mut config_rank: FxHashMap<NodeKind, usize> = FxHashMap::default();
        for (idx, kind) in self.execution_order.iter().enumerate() {
            config_rank.insert(*kind, idx + 1);
        }

        let mut available = Vec::new();
        if statement.activity.is_some() {
            available.push(NodeKind::Activity);
        }
        if statement.sequence.as_ref().is_some_and(|s| !s.is_empty()) {
            available.push(NodeKind::Sequence);
        }
        if statement.parallel.as_ref().is_some_and(|p| !p.is_empty()) {
            available.push(NodeKind::Parallel);
        }

        available.sort_by_key(|kind| {
            config_rank
                .get(kind)
                .or_else(|| default_rank.get(kind))
                .copied()
                .unwrap_or(usize::MAX)
        });

        available
    }
}

impl Statement {
    /// Evaluate the guard, pick one sub-node, run it, merge its delta.
    ///
    /// A false predicate or an absent sub-node returns the input binding
    /// unchanged.
    pub fn execute<'a>(
        &'a self,
        ctx: &'a ExecContext,
        binding: &'a Binding,
    ) -> BoxFuture<'a, Result<Binding>> {
        Box::pin(async move {
            if !self.control.predicate(ctx, binding).await? {
                return Ok(binding::clone_binding(binding));
            }

            let order = self.control.resolve_order(self);
            let Some(kind) = order.first().copied() else {
                return Ok(binding::clone_binding(binding));
            };

            let outcome = match kind {
                NodeKind::Activity => match &self.activity {
                    Some(activity) => activity.execute(ctx, binding).await,
                    None => Ok(binding::clone_binding(binding)),
                },
                NodeKind::Sequence => match &self.sequence {
                    Some(children) => execute_sequence(children, ctx, binding).await,
                    None => Ok(binding::clone_binding(binding)),
                },
                NodeKind::Parallel => match &self.parallel {
                    Some(children) => execute_parallel(children, ctx, binding).await,
                    None => Ok(binding::clone_binding(binding)),
                },
            };

            match outcome {
                Ok(delta) => {
                    let mut result = binding::clone_binding(binding);
                    binding::assign(&mut result, &delta);
                    Ok(result)
                }
                Err(e) if self.control.ignores_errors() => {
                    warn!(node = %kind, error = %e, "statement sub-node failed, ignored");
                    Ok(binding::clone_binding(binding))
                }
                Err(e) => Err(e),
            }
        })
    }
}
