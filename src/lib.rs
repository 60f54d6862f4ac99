//! Resilient edge: outbound-call resilience and inbound admission control.
//!
//! Outbound calls go through [`ResilientClient`] (retries with backoff,
//! per-destination circuit breaking, per-attempt timeouts, typed errors).
//! Inbound webhook events pass through [`admission`] (dedup, per-user rate
//! limits, idempotency) backed by a TTL key-value [`store`].

pub mod admin;
pub mod admission;
pub mod clock;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod store;

pub use admission::{Admission, EventDeduplicator, IdempotencyGuard, RateLimiter};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::EdgeConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resilience::{ClientError, FetchError, ResilientClient, RetryOptions};
pub use store::{KvStore, MemoryStore, SharedStore};
