//! Admission control for inbound events.
//!
//! # Data Flow
//! ```text
//! Inbound event:
//!     → dedup.rs (drop redeliveries)
//!     → rate_limit.rs (per user, per command class)
//!     → idempotency.rs (claim operation id before side effects)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - All state lives in the shared store; nothing is held in process
//! - Every primitive fails open on store errors and logs a warning
//! - Checks return plain booleans so callers branch without error plumbing

pub mod dedup;
pub mod idempotency;
pub mod rate_limit;

pub use dedup::EventDeduplicator;
pub use idempotency::{Guarded, IdempotencyGuard, OperationState};
pub use rate_limit::{RateLimitDecision, RateLimitWindow, RateLimiter};

use crate::clock::SharedClock;
use crate::config::EdgeConfig;
use crate::store::SharedStore;

/// The three admission primitives sharing one store.
#[derive(Clone)]
pub struct Admission {
    pub dedup: EventDeduplicator,
    pub rate_limiter: RateLimiter,
    pub idempotency: IdempotencyGuard,
}

impl Admission {
    pub fn from_config(config: &EdgeConfig, store: SharedStore, clock: SharedClock) -> Self {
        Self {
            dedup: EventDeduplicator::new(store.clone(), config.dedup.clone()),
            rate_limiter: RateLimiter::new(store.clone(), config.rate_limit.clone(), clock),
            idempotency: IdempotencyGuard::new(store, config.idempotency.clone()),
        }
    }
}
