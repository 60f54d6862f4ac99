//! In-process TTL store.
//!
//! Suitable for a single edge process and for tests. Under horizontal
//! scale-out each process gets its own copy, so dedup and rate limits
//! become per-process; swap in a shared backend for fleet-wide state.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::clock::SharedClock;
use crate::store::{KvStore, StoreResult};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at_ms: u64,
}

impl StoredValue {
    fn is_live(&self, now_ms: u64) -> bool {
        self.expires_at_ms > now_ms
    }
}

/// A thread-safe, clock-driven key-value store with per-entry TTL.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, StoredValue>>,
    clock: SharedClock,
}

impl MemoryStore {
    /// Create an empty store reading time from `clock`.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            clock,
        }
    }

    fn expiry(&self, ttl_secs: u64) -> u64 {
        self.clock
            .now_millis()
            .saturating_add(ttl_secs.saturating_mul(1000))
    }

    /// Number of entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.inner.len();
        self.inner.retain(|_, v| v.is_live(now));
        before.saturating_sub(self.inner.len())
    }

    /// Periodically purge expired entries until shutdown.
    pub async fn run_sweeper(self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.purge_expired();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.len(), "Purged expired store entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Store sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now_millis();
        let expired = match self.inner.get(key) {
            Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.inner.remove_if(key, |_, v| !v.is_live(now));
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        let stored = StoredValue {
            value: value.to_string(),
            expires_at_ms: self.expiry(ttl_secs),
        };
        self.inner.insert(key.to_string(), stored);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.remove(key);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<bool> {
        let now = self.clock.now_millis();
        let stored = StoredValue {
            value: value.to_string(),
            expires_at_ms: self.expiry(ttl_secs),
        };
        // The shard lock held by `entry` makes the check and the write one step.
        match self.inner.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    Ok(false)
                } else {
                    occupied.insert(stored);
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(stored);
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store_with_clock() -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        (MemoryStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (store, _) = store_with_clock();
        assert!(store.get("a").await.unwrap().is_none());

        store.put("a", "1", 60).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        store.put("a", "2", 60).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));

        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let (store, clock) = store_with_clock();
        store.put("a", "1", 10).await.unwrap();

        clock.advance(Duration::from_millis(9_999));
        assert!(store.get("a").await.unwrap().is_some());

        clock.advance(Duration::from_millis(1));
        assert!(store.get("a").await.unwrap().is_none());
        // Lazily removed on read
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_put_if_absent_respects_expiry() {
        let (store, clock) = store_with_clock();
        assert!(store.put_if_absent("k", "first", 5).await.unwrap());
        assert!(!store.put_if_absent("k", "second", 5).await.unwrap());

        clock.advance(Duration::from_secs(5));
        assert!(store.put_if_absent("k", "third", 5).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("third"));
    }

    #[tokio::test]
    async fn test_put_if_absent_single_winner_under_contention() {
        let (store, _) = store_with_clock();
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.put_if_absent("race", &i.to_string(), 60).await.unwrap()
            }));
        }

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (store, clock) = store_with_clock();
        store.put("short", "x", 1).await.unwrap();
        store.put("long", "y", 100).await.unwrap();

        clock.advance(Duration::from_secs(2));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }
}
