//! Timeout enforcement.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; elapsing drops (cancels) the in-flight future
//! - Timeout errors are distinct from other errors
//! - No deadline configured means the future runs to completion

use std::future::Future;
use std::time::Duration;

use crate::resilience::error::FetchError;

/// Run `fut` bounded by `timeout_ms`, mapping expiry to [`FetchError::Timeout`].
pub async fn with_deadline<F, T>(timeout_ms: Option<u64>, fut: F) -> Result<T, FetchError>
where
    F: Future<Output = T>,
{
    match timeout_ms {
        Some(ms) => tokio::time::timeout(Duration::from_millis(ms), fut)
            .await
            .map_err(|_| FetchError::Timeout { timeout_ms: ms }),
        None => Ok(fut.await),
    }
}
