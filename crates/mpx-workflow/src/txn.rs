use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use mpx_store::{EntityStore, Transaction};
use tracing::warn;

use crate::WorkflowError;

/// Bounded exponential backoff for transaction conflicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. At least 1.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff: Duration::from_millis(base_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    /// Delay before attempt `failed + 1`, after `failed` conflicts.
    pub fn backoff(&self, failed: u32) -> Duration {
        let shift = failed.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

/// Run `op` inside a fresh [`Transaction`] and commit it.
///
/// `op` receives the transaction by value and hands it back with its result,
/// so nothing it staged outlives a failed attempt. When either `op` or the
/// commit reports a conflict, the whole closure runs again on fresh reads
/// after a backoff. Any other error aborts without writing.
pub async fn run_transaction<T, F, Fut>(
    store: &Arc<dyn EntityStore>,
    policy: &RetryPolicy,
    op_name: &'static str,
    mut op: F,
) -> Result<T, WorkflowError>
where
    F: FnMut(Transaction) -> Fut,
    Fut: Future<Output = Result<(Transaction, T), WorkflowError>>,
{
    let mut attempt: u32 = 1;
    loop {
        let tx = Transaction::new(Arc::clone(store));
        let outcome = match op(tx).await {
            Ok((tx, value)) => tx
                .commit()
                .await
                .map(|()| value)
                .map_err(WorkflowError::from),
            Err(err) => Err(err),
        };

        match outcome {
            Err(err) if err.is_conflict() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    op = op_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transaction conflict; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) if err.is_conflict() => {
                warn!(op = op_name, attempt, error = %err, "transaction conflict; retries exhausted");
                return Err(err);
            }
            other => return other,
        }
    }
}
