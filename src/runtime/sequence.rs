//! Sequence execution - serial composition
//!
//! Children run in declaration order, each delta folding into the working
//! binding. A child marked `onerror: ignore` keeps the pre-failure
//! binding; a child marked `onexit: exit` returns immediately and hands
//! the remaining tail to a detached task whose result is discarded.

use tracing::warn;

use crate::ast::Statement;
use crate::binding::{self, Binding};
use crate::context::ExecContext;
use crate::error::Result;

/// Run child statements serially against a copy of the input binding.
pub async fn execute_sequence(
    children: &[Statement],
    ctx: &ExecContext,
    binding: &Binding,
) -> Result<Binding> {
    let mut current = binding::clone_binding(binding);
    let scope = ctx.child();

    for (index, statement) in children.iter().enumerate() {
        // Ambient cancellation is observed between children.
        ctx.check("sequence")?;

        match statement.execute(&scope, &current).await {
            Ok(delta) => {
                binding::assign(&mut current, &delta);

                if statement.control.exits_after() {
                    spawn_detached_tail(&children[index + 1..], current.clone());
                    return Ok(current);
                }
            }
            Err(e) => {
                if statement.control.ignores_errors() {
                    warn!(child = index, error = %e, "sequence child failed, ignored");
                    continue;
                }
                scope.cancel();
                return Err(e);
            }
        }
    }

    Ok(current)
}

/// Fire-and-forget execution of the remaining children on a fresh root
/// context, so no inherited deadline truncates the tail. Errors are
/// logged, never surfaced.
fn spawn_detached_tail(tail: &[Statement], binding: Binding) {
    if tail.is_empty() {
        return;
    }
    let tail: Vec<Statement> = tail.to_vec();

    tokio::spawn(async move {
        let ctx = ExecContext::root();
        let mut current = binding;
        for statement in &tail {
            match statement.execute(&ctx, &current).await {
                Ok(delta) => binding::assign(&mut current, &delta),
                Err(e) => {
                    warn!(error = %e, "detached tail statement failed");
                    break;
                }
            }
        }
    });
}
