//! Idempotency guard for side-effecting operations.
//!
//! A marker under `{prefix}{operation_id}` moves from `in-progress` to
//! `completed`. Either state blocks re-execution until the TTL lapses. A crash
//! between start and completion leaves `in-progress` behind for the full TTL;
//! [`IdempotencyGuard::abandon_operation`] clears it when the caller knows
//! the side effect did not happen.

use std::fmt;
use std::future::Future;

use crate::config::IdempotencyConfig;
use crate::observability::metrics;
use crate::store::{namespaced, SharedStore};

/// Recorded state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    InProgress,
    Completed,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::InProgress => "in-progress",
            OperationState::Completed => "completed",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "in-progress" => Some(OperationState::InProgress),
            "completed" => Some(OperationState::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`IdempotencyGuard::run`].
#[derive(Debug, PartialEq, Eq)]
pub enum Guarded<T> {
    /// The operation ran and returned this value.
    Ran(T),
    /// A marker already existed; nothing ran.
    Skipped,
}

/// Start/complete bookkeeping for operation ids.
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: SharedStore,
    config: IdempotencyConfig,
}

impl IdempotencyGuard {
    pub fn new(store: SharedStore, config: IdempotencyConfig) -> Self {
        Self { store, config }
    }

    fn key(&self, operation_id: &str) -> String {
        namespaced(&self.config.key_prefix, operation_id)
    }

    /// Claim `operation_id`. True means the caller should proceed.
    ///
    /// On store failure the caller proceeds.
    pub async fn start_operation(&self, operation_id: &str) -> bool {
        let key = self.key(operation_id);
        match self
            .store
            .put_if_absent(&key, OperationState::InProgress.as_str(), self.config.ttl_secs)
            .await
        {
            Ok(true) => {
                metrics::record_idempotency("started");
                true
            }
            Ok(false) => {
                tracing::info!(operation_id = %operation_id, "Operation already claimed, skipping");
                metrics::record_idempotency("skipped");
                false
            }
            Err(e) => {
                tracing::warn!(operation_id = %operation_id, error = %e, "Idempotency check failed, proceeding");
                metrics::record_idempotency("store_error");
                true
            }
        }
    }

    /// Mark `operation_id` completed for the configured TTL.
    pub async fn complete_operation(&self, operation_id: &str) {
        let key = self.key(operation_id);
        match self
            .store
            .put(&key, OperationState::Completed.as_str(), self.config.ttl_secs)
            .await
        {
            Ok(()) => metrics::record_idempotency("completed"),
            Err(e) => {
                tracing::warn!(operation_id = %operation_id, error = %e, "Failed to mark operation completed");
            }
        }
    }

    /// Release a claim whose side effect did not happen, allowing a retry.
    pub async fn abandon_operation(&self, operation_id: &str) {
        let key = self.key(operation_id);
        match self.store.delete(&key).await {
            Ok(()) => metrics::record_idempotency("abandoned"),
            Err(e) => {
                tracing::warn!(operation_id = %operation_id, error = %e, "Failed to release operation claim");
            }
        }
    }

    /// Current marker, if any. Unknown values and store failures read as none.
    pub async fn operation_state(&self, operation_id: &str) -> Option<OperationState> {
        match self.store.get(&self.key(operation_id)).await {
            Ok(raw) => raw.as_deref().and_then(OperationState::parse),
            Err(e) => {
                tracing::warn!(operation_id = %operation_id, error = %e, "Failed to read operation state");
                None
            }
        }
    }

    /// Run `op` at most once per `operation_id`.
    ///
    /// `Ok` completes the operation. `Err` abandons the claim so a redelivery
    /// can try again.
    pub async fn run<T, E, F, Fut>(&self, operation_id: &str, op: F) -> Result<Guarded<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.start_operation(operation_id).await {
            return Ok(Guarded::Skipped);
        }
        match op().await {
            Ok(value) => {
                self.complete_operation(operation_id).await;
                Ok(Guarded::Ran(value))
            }
            Err(e) => {
                self.abandon_operation(operation_id).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{KvStore, MemoryStore};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn guard() -> (IdempotencyGuard, Arc<ManualClock>, MemoryStore) {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = MemoryStore::new(clock.clone());
        (
            IdempotencyGuard::new(Arc::new(store.clone()), IdempotencyConfig::default()),
            clock,
            store,
        )
    }

    #[tokio::test]
    async fn test_start_once() {
        let (g, _, _) = guard();
        assert!(g.start_operation("op-1").await);
        assert!(!g.start_operation("op-1").await);
        assert_eq!(g.operation_state("op-1").await, Some(OperationState::InProgress));

        g.complete_operation("op-1").await;
        assert!(!g.start_operation("op-1").await);
        assert_eq!(g.operation_state("op-1").await, Some(OperationState::Completed));
    }

    #[tokio::test]
    async fn test_stale_in_progress_lapses() {
        let (g, clock, _) = guard();
        assert!(g.start_operation("op-1").await);
        clock.advance(Duration::from_secs(3599));
        assert!(!g.start_operation("op-1").await);
        clock.advance(Duration::from_secs(1));
        assert!(g.start_operation("op-1").await);
    }

    #[tokio::test]
    async fn test_completion_refreshes_ttl() {
        let (g, clock, _) = guard();
        assert!(g.start_operation("op-1").await);
        clock.advance(Duration::from_secs(1800));
        g.complete_operation("op-1").await;
        clock.advance(Duration::from_secs(1800));
        assert_eq!(g.operation_state("op-1").await, Some(OperationState::Completed));
    }

    #[tokio::test]
    async fn test_abandon_allows_retry() {
        let (g, _, _) = guard();
        assert!(g.start_operation("op-1").await);
        g.abandon_operation("op-1").await;
        assert_eq!(g.operation_state("op-1").await, None);
        assert!(g.start_operation("op-1").await);
    }

    #[tokio::test]
    async fn test_run_executes_once() {
        let (g, _, _) = guard();
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let result: Result<_, ()> = g
                .run("op-1", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await;
            assert!(result.is_ok());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_failure_releases_claim() {
        let (g, _, _) = guard();
        let first: Result<Guarded<()>, &str> = g.run("op-1", || async { Err("boom") }).await;
        assert_eq!(first, Err("boom"));

        let second: Result<Guarded<u8>, &str> = g.run("op-1", || async { Ok(1) }).await;
        assert_eq!(second, Ok(Guarded::Ran(1)));
    }

    #[tokio::test]
    async fn test_unknown_marker_reads_as_none() {
        let (g, _, store) = guard();
        store.put("idempotency:op-1", "garbage", 60).await.unwrap();
        assert_eq!(g.operation_state("op-1").await, None);
        assert!(!g.start_operation("op-1").await);
    }
}
