//! Failure taxonomy for outbound HTTP calls.

use reqwest::StatusCode;
use thiserror::Error;

/// Terminal outcome of a failed call attempt. Closed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection, DNS, TLS or body transfer failure.
    #[error("network error: {message}")]
    Network { message: String },

    /// Destination answered 429.
    #[error("rate limited by upstream{}", fmt_retry_after(.retry_after_ms))]
    RateLimited { retry_after_ms: Option<u64> },

    /// Destination answered 5xx.
    #[error("upstream server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Destination answered a 4xx other than 429.
    #[error("upstream rejected request with {status}: {message}")]
    Http { status: u16, message: String },

    /// The per-attempt deadline elapsed.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

fn fmt_retry_after(retry_after_ms: &Option<u64>) -> String {
    match retry_after_ms {
        Some(ms) => format!(" (retry after {ms}ms)"),
        None => String::new(),
    }
}

impl FetchError {
    /// Classify a non-success status.
    pub fn from_status(status: StatusCode, message: String, retry_after_ms: Option<u64>) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            FetchError::RateLimited { retry_after_ms }
        } else if status.is_server_error() {
            FetchError::Server {
                status: status.as_u16(),
                message,
            }
        } else {
            FetchError::Http {
                status: status.as_u16(),
                message,
            }
        }
    }

    /// Whether the retry loop is allowed to try again after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Network { .. } | FetchError::RateLimited { .. } | FetchError::Server { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }

    /// HTTP status carried by the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::RateLimited { .. } => Some(429),
            FetchError::Server { status, .. } | FetchError::Http { status, .. } => Some(*status),
            FetchError::Network { .. } | FetchError::Timeout { .. } => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network { .. } => "network",
            FetchError::RateLimited { .. } => "rate_limited",
            FetchError::Server { .. } => "server",
            FetchError::Http { .. } => "http",
            FetchError::Timeout { .. } => "timeout",
        }
    }
}

/// Everything the resilient client can fail with.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The destination's breaker is open; no network call was made.
    #[error("circuit open for {destination}, retry in {retry_in_ms}ms")]
    CircuitOpen { destination: String, retry_in_ms: u64 },

    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Fetch(e) if e.is_timeout())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Fetch(e) => e.kind(),
            ClientError::CircuitOpen { .. } => "circuit_open",
            ClientError::Cancelled => "cancelled",
            ClientError::InvalidRequest(_) => "invalid_request",
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
