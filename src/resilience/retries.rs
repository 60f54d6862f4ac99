//! Retry policy.
//!
//! # Responsibilities
//! - Decide which responses are worth another attempt (429, 5xx)
//! - Carry per-call overrides of the configured retry defaults
//! - Thread a cancellation token into the retry loop
//!
//! # Design Decisions
//! - Transport errors are always retryable; timeouts never are
//! - A caller predicate can veto a retry but cannot force one on a 2xx or 4xx
//! - Unset fields fall back to the client's configured defaults

use reqwest::{Response, StatusCode};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;

/// Caller-supplied veto over retrying a retryable response.
pub type RetryPredicate = Arc<dyn Fn(&Response) -> bool + Send + Sync>;

/// 429 and every 5xx.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Per-call retry options. `None` fields use the client defaults.
#[derive(Clone, Default)]
pub struct RetryOptions {
    pub max_retries: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub should_retry: Option<RetryPredicate>,
    /// Breaker key override; defaults to the URL's scheme, host and port.
    pub destination: Option<String>,
    pub cancellation: Option<CancellationToken>,
}

impl RetryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn initial_delay_ms(mut self, initial_delay_ms: u64) -> Self {
        self.initial_delay_ms = Some(initial_delay_ms);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Merge with defaults into the values the loop runs with.
    pub(crate) fn resolve(&self, defaults: &RetryConfig) -> ResolvedRetry {
        ResolvedRetry {
            max_attempts: self.max_retries.unwrap_or(defaults.max_retries).max(1),
            initial_delay_ms: self.initial_delay_ms.unwrap_or(defaults.initial_delay_ms),
            timeout_ms: self.timeout_ms.or(defaults.timeout_ms),
        }
    }

    /// Whether a retryable response should actually be retried.
    pub(crate) fn permits_retry(&self, response: &Response) -> bool {
        if !is_retryable_status(response.status()) {
            return false;
        }
        match &self.should_retry {
            Some(predicate) => predicate(response),
            None => true,
        }
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_retries", &self.max_retries)
            .field("initial_delay_ms", &self.initial_delay_ms)
            .field("timeout_ms", &self.timeout_ms)
            .field("should_retry", &self.should_retry.is_some())
            .field("destination", &self.destination)
            .field("cancellable", &self.cancellation.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResolvedRetry {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub timeout_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::from_u16(599).unwrap()));
        for code in [200u16, 204, 400, 401, 403, 404, 409, 422] {
            assert!(!is_retryable_status(StatusCode::from_u16(code).unwrap()), "{code}");
        }
    }

    #[test]
    fn test_resolve_uses_defaults() {
        let defaults = RetryConfig::default();
        let resolved = RetryOptions::new().resolve(&defaults);
        assert_eq!(
            resolved,
            ResolvedRetry { max_attempts: 3, initial_delay_ms: 500, timeout_ms: None }
        );

        let resolved = RetryOptions::new()
            .max_retries(0)
            .initial_delay_ms(10)
            .timeout_ms(250)
            .resolve(&defaults);
        assert_eq!(
            resolved,
            ResolvedRetry { max_attempts: 1, initial_delay_ms: 10, timeout_ms: Some(250) }
        );
    }

    fn response(status: u16) -> Response {
        let raw = axum::http::Response::builder()
            .status(status)
            .body("")
            .unwrap();
        Response::from(raw)
    }

    #[test]
    fn test_predicate_vetoes_retry() {
        let opts = RetryOptions::new().should_retry(|r| r.status() != StatusCode::SERVICE_UNAVAILABLE);
        assert!(opts.permits_retry(&response(500)));
        assert!(!opts.permits_retry(&response(503)));
        assert!(!opts.permits_retry(&response(404)));
        assert!(RetryOptions::new().permits_retry(&response(503)));
    }
}
