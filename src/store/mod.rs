//! Shared key-value storage subsystem.
//!
//! # Data Flow
//! ```text
//! admission primitives (rate_limit, dedup, idempotency)
//!     → KvStore (get / put with TTL / delete)
//!     → backend (memory.rs, or any eventually consistent TTL store)
//! ```
//!
//! # Design Decisions
//! - The store is the only state shared across stateless invocations
//! - No transactions are assumed; `put_if_absent` is atomic only when the
//!   backend can make it so, otherwise it degrades to get-then-put
//! - Each primitive owns a disjoint key prefix

pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use memory::MemoryStore;

/// Errors surfaced by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not be reached or rejected the operation.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored value could not be decoded.
    #[error("corrupt value under key '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// An eventually consistent, TTL-capable key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write `value` under `key`, expiring after `ttl_secs`.
    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Write only if no live value exists. Returns true when this call wrote.
    ///
    /// The default is a plain read followed by a write, so two racing callers
    /// can both observe "absent" and both get `true`. Backends with a native
    /// conditional write should override it.
    async fn put_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<bool> {
        if self.get(key).await?.is_some() {
            return Ok(false);
        }
        self.put(key, value, ttl_secs).await?;
        Ok(true)
    }
}

/// Shared handle to a store.
pub type SharedStore = Arc<dyn KvStore>;

/// Join a namespace prefix and an identifier into a store key.
pub fn namespaced(prefix: &str, id: &str) -> String {
    let mut key = String::with_capacity(prefix.len() + id.len());
    key.push_str(prefix);
    key.push_str(id);
    key
}
