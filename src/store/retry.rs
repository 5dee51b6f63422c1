use super::{Catalog, CommitOutcome, Store, WriteBatch};
use crate::audit::ActorContext;
use crate::core::{RecordId, StoreError, StoreResult};
use crate::record::StoredRow;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 25,
            max_backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// A policy that gives up after the first failure.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`: doubling from the initial backoff, capped.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let base = self.initial_backoff_ms.max(1);
        let max = self.max_backoff_ms.max(base);
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        base.saturating_mul(factor).min(max)
    }
}

/// Retries transient failures of the wrapped store with capped exponential
/// backoff. Any other error, and every rejection, is passed through untouched.
#[derive(Debug)]
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: Store> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = StoreResult<T>> + Send,
        T: Send,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Err(err) if err.is_transient() => {
                    if attempt >= max_attempts {
                        warn!(operation, attempts = attempt, error = %err, "store retries exhausted");
                        return Err(StoreError::RetriesExhausted {
                            attempts: attempt,
                            last: err.to_string(),
                        });
                    }
                    let delay = self.policy.backoff_ms(attempt);
                    warn!(operation, attempt, delay_ms = delay, error = %err, "transient store failure, retrying");
                    sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl<S: Store> Store for RetryingStore<S> {
    fn catalog(&self) -> &Catalog {
        self.inner.catalog()
    }

    async fn load(&self, table: &str, id: RecordId) -> StoreResult<Option<StoredRow>> {
        self.with_retry("load", || self.inner.load(table, id)).await
    }

    async fn scan(&self, table: &str) -> StoreResult<Vec<StoredRow>> {
        self.with_retry("scan", || self.inner.scan(table)).await
    }

    async fn commit(&self, actor: &ActorContext, batch: WriteBatch) -> StoreResult<CommitOutcome> {
        self.with_retry("commit", || self.inner.commit(actor, batch.clone()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
        };
        let delays: Vec<_> = (1..=5).map(|attempt| policy.backoff_ms(attempt)).collect();
        assert_eq!(delays, vec![10, 20, 40, 50, 50]);
    }

    #[test]
    fn zero_initial_backoff_still_waits() {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        };
        assert_eq!(policy.backoff_ms(1), 1);
    }
}
