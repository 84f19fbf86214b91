//! Execution context - scoped cancellation and deadlines
//!
//! Every execute entry point threads an [`ExecContext`]: a cancellation
//! token plus an optional deadline. Child scopes derive from the parent so
//! a composite can cancel its siblings or its remainder without cancelling
//! the caller.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{PlaitError, Result};

/// Cancellable ambient context with an optional deadline.
///
/// Cloning shares the same scope; [`ExecContext::child`] derives a new
/// scope that observes the parent's cancellation but can be cancelled
/// independently.
#[derive(Debug, Clone)]
pub struct ExecContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
}

impl ExecContext {
    /// A fresh root context: never expires, cancelled only explicitly.
    pub fn root() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            timeout: None,
        }
    }

    /// Derive a child scope. Cancelling the child leaves the parent alive;
    /// cancelling the parent cancels the child. The deadline is inherited.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            timeout: self.timeout,
        }
    }

    /// Derive a child scope with a deadline. An earlier inherited deadline
    /// stays in effect.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
            timeout: Some(timeout),
        }
    }

    /// Cancel this scope and every scope derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline_exceeded()
    }

    /// True once the scoped deadline has passed.
    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Error out if the scope is already done. Checked at every natural
    /// yield point: between sequence children, before spawning workers,
    /// and around retry sleeps.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.deadline_exceeded() {
            return Err(self.timeout_error(operation));
        }
        if self.token.is_cancelled() {
            return Err(PlaitError::Cancelled {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Resolve when the scope is done (cancelled or past its deadline).
    pub async fn done(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = Self::deadline_elapsed(self.deadline) => {}
        }
    }

    /// Race a future against this scope. Returns the future's result, or
    /// a timeout/cancellation error when the scope ends first.
    pub async fn run<T>(
        &self,
        operation: &str,
        fut: impl std::future::Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        tokio::select! {
            res = fut => res,
            _ = Self::deadline_elapsed(self.deadline) => Err(self.timeout_error(operation)),
            _ = self.token.cancelled() => Err(PlaitError::Cancelled {
                operation: operation.to_string(),
            }),
        }
    }

    /// Cancellable sleep. A scope that is already done never sleeps.
    pub async fn sleep(&self, duration: Duration, operation: &str) -> Result<()> {
        self.check(operation)?;
        self.run(operation, async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }

    async fn deadline_elapsed(deadline: Option<Instant>) {
        match deadline {
            Some(d) => tokio::time::sleep_until(d).await,
            None => std::future::pending().await,
        }
    }

    fn timeout_error(&self, operation: &str) -> PlaitError {
        PlaitError::Timeout {
            operation: operation.to_string(),
            duration_ms: self.timeout.map(|t| t.as_millis() as u64).unwrap_or(0),
        }
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn root_context_is_live() {
        let ctx = ExecContext::root();
        assert!(!ctx.is_cancelled());
        assert!(ctx.check("noop").is_ok());
    }

    #[tokio::test]
    async fn cancel_propagates_to_children_not_parents() {
        let parent = ExecContext::root();
        let child = parent.child();
        let grandchild = child.child();

        child.cancel();

        assert!(!parent.is_cancelled());
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires_with_timeout_error() {
        let ctx = ExecContext::root().with_timeout(Duration::from_secs(2));
        assert!(ctx.check("op").is_ok());

        tokio::time::advance(Duration::from_secs(3)).await;

        assert!(ctx.deadline_exceeded());
        let err = ctx.check("op").unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn child_inherits_the_earlier_deadline() {
        let outer = ExecContext::root().with_timeout(Duration::from_secs(1));
        let inner = outer.with_timeout(Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(inner.deadline_exceeded());
    }

    #[tokio::test(start_paused = true)]
    async fn run_races_deadline() {
        let ctx = ExecContext::root().with_timeout(Duration::from_millis(100));
        let err = ctx
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn run_races_cancellation() {
        let ctx = ExecContext::root();
        let child = ctx.child();
        child.cancel();

        let err = child
            .run("pending", async {
                std::future::pending::<Result<()>>().await
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PlaitError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn cancelled_scope_never_sleeps() {
        let ctx = ExecContext::root();
        ctx.cancel();
        // Would hang for a minute if the guard were missing.
        let err = ctx.sleep(Duration::from_secs(60), "backoff").await;
        assert!(err.is_err());
    }
}
