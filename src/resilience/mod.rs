//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call (client.rs):
//!     → circuit_breaker.rs (fail fast if destination is cooling down)
//!     → timeouts.rs (enforce per-attempt deadline)
//!     → On failure: retries.rs (retryable?) + backoff.rs (how long to wait)
//!     → error.rs (typed terminal outcome)
//! ```
//!
//! # Design Decisions
//! - Timeouts cancel the in-flight attempt and are never retried
//! - Breaker state is per process; each process protects itself
//! - Backoff is exact exponential unless jitter is configured

pub mod backoff;
pub mod circuit_breaker;
pub mod client;
pub mod error;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerDecision, BreakerSnapshot, CircuitBreakerRegistry, CircuitState};
pub use client::{Outcome, ResilientClient};
pub use error::{ClientError, ClientResult, FetchError};
pub use retries::{RetryOptions, RetryPredicate};
