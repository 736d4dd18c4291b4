//! Timeout and cancellation for connector calls

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Caller-supplied limits applied to every connector call of one operation
#[derive(Debug, Clone)]
pub struct OpContext {
    timeout: Duration,
    cancel: CancellationToken,
}

impl OpContext {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    /// A context with the given timeout and a fresh token
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(timeout, CancellationToken::new())
    }

    /// Context for a sub-task: cancelled with its parent, cancellable on its own
    pub fn child(&self) -> Self {
        Self {
            timeout: self.timeout,
            cancel: self.cancel.child_token(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail with `Cancelled` if the token has fired
    pub fn check(&self, op: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled(op.to_string()))
        } else {
            Ok(())
        }
    }

    /// Run one connector call under the timeout and cancellation signal.
    ///
    /// A cancelled or timed-out call is abandoned; whatever the server already
    /// committed stays committed.
    pub async fn run<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check(op)?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled(op.to_string())),
            outcome = tokio::time::timeout(self.timeout, fut) => match outcome {
                Ok(result) => result,
                Err(_) => Err(Error::transient(format!(
                    "{} timed out after {:?}",
                    op, self.timeout
                ))),
            },
        }
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn times_out_as_transient_connection_error() {
        let ctx = OpContext::with_timeout(Duration::from_millis(10));
        let err = ctx
            .run("slow query", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn cancelled_parent_cancels_child() {
        let ctx = OpContext::default();
        let child = ctx.child();
        ctx.cancel();
        let err = child.run("query", async { Ok(1) }).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }

    #[tokio::test]
    async fn passes_result_through() {
        let ctx = OpContext::default();
        assert_eq!(ctx.run("query", async { Ok(7) }).await.unwrap(), 7);
    }
}
