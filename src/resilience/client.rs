//! Retrying HTTP client.
//!
//! # Responsibilities
//! - Gate every attempt on the destination's circuit breaker
//! - Bound each attempt with a deadline
//! - Retry transport errors and retryable statuses with backoff
//! - Report the terminal outcome as a response or a typed error
//!
//! # Design Decisions
//! - One attempt loop, two views: [`ResilientClient::fetch`] hands back any
//!   HTTP response for the caller to inspect, [`ResilientClient::fetch_typed`]
//!   turns every non-2xx into a [`FetchError`]
//! - The breaker registry is owned by the client and shared via `Arc`, so
//!   every call site that holds the client shares one per-process view
//! - Timeouts and non-retryable 4xx are never retried
//! - A timeout does not count as a breaker failure

use reqwest::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::SharedClock;
use crate::config::{CircuitBreakerConfig, RetryConfig};
use crate::observability::metrics;
use crate::resilience::backoff::{next_delay, parse_retry_after};
use crate::resilience::circuit_breaker::{destination_key, BreakerDecision, CircuitBreakerRegistry};
use crate::resilience::error::{ClientError, ClientResult, FetchError};
use crate::resilience::retries::RetryOptions;
use crate::resilience::timeouts::with_deadline;

/// Longest upstream body excerpt carried in a typed error.
const MAX_ERROR_BODY: usize = 512;

/// How the attempt loop ended when the destination answered.
#[derive(Debug)]
pub enum Outcome {
    /// A 2xx response.
    Success(Response),
    /// A response that must not be retried (non-retryable status or predicate veto).
    Final(Response),
    /// Retries ran out on a retryable status; this is the last response.
    Exhausted { response: Response, attempts: u32 },
}

impl Outcome {
    pub fn into_response(self) -> Response {
        match self {
            Outcome::Success(r) | Outcome::Final(r) => r,
            Outcome::Exhausted { response, .. } => response,
        }
    }
}

enum LastFailure {
    Response(Response),
    Error(FetchError),
}

/// HTTP client with retries, deadlines and per-destination circuit breaking.
///
/// Cheap to clone; clones share the connection pool and breaker registry.
#[derive(Clone)]
pub struct ResilientClient {
    http: reqwest::Client,
    breakers: Arc<CircuitBreakerRegistry>,
    defaults: RetryConfig,
}

impl ResilientClient {
    pub fn new(http: reqwest::Client, breakers: Arc<CircuitBreakerRegistry>, defaults: RetryConfig) -> Self {
        Self {
            http,
            breakers,
            defaults,
        }
    }

    /// Build a client with its own breaker registry.
    pub fn from_config(
        retries: RetryConfig,
        breaker: CircuitBreakerConfig,
        clock: SharedClock,
    ) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("resilient-edge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        let breakers = Arc::new(CircuitBreakerRegistry::new(breaker, clock));
        Ok(Self::new(http, breakers, retries))
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn defaults(&self) -> &RetryConfig {
        &self.defaults
    }

    /// Send `request` with retries.
    ///
    /// Returns the response for 2xx, for non-retryable statuses and for the
    /// last attempt when retries run out on a retryable status. Transport
    /// failures, timeouts, open circuits and cancellation are errors.
    pub async fn fetch(&self, request: Request, options: &RetryOptions) -> ClientResult<Response> {
        self.execute(request, options).await.map(Outcome::into_response)
    }

    /// Like [`fetch`](Self::fetch), but any non-2xx outcome becomes a typed error.
    pub async fn fetch_typed(&self, request: Request, options: &RetryOptions) -> ClientResult<Response> {
        match self.execute(request, options).await? {
            Outcome::Success(response) => Ok(response),
            Outcome::Final(response) | Outcome::Exhausted { response, .. } => {
                Err(classify_response(response).await.into())
            }
        }
    }

    pub async fn get(&self, url: &str, options: &RetryOptions) -> ClientResult<Response> {
        let request = self.build(Method::GET, url, None::<&()>)?;
        self.fetch(request, options).await
    }

    /// POST a JSON body, typed-error view.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        options: &RetryOptions,
    ) -> ClientResult<Response> {
        let request = self.build(Method::POST, url, Some(body))?;
        self.fetch_typed(request, options).await
    }

    fn build<T: Serialize + ?Sized>(&self, method: Method, url: &str, body: Option<&T>) -> ClientResult<Request> {
        let mut builder = self.http.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder
            .build()
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))
    }

    /// The attempt loop shared by both views.
    pub async fn execute(&self, request: Request, options: &RetryOptions) -> ClientResult<Outcome> {
        let policy = options.resolve(&self.defaults);
        let destination = options
            .destination
            .clone()
            .unwrap_or_else(|| destination_key(request.url()));
        let cancel = options.cancellation.clone().unwrap_or_default();

        let mut pending = Some(request);
        let mut last: Option<LastFailure> = None;
        let mut attempts = 0u32;

        for attempt in 0..policy.max_attempts {
            let Some(request) = pending.take() else {
                break;
            };
            // Streaming bodies cannot be replayed; such requests get one attempt.
            pending = request.try_clone();

            let decision = self.breakers.check(&destination);
            if let BreakerDecision::Rejected { retry_in } = decision {
                if last.is_some() {
                    break;
                }
                tracing::debug!(destination = %destination, retry_in = ?retry_in, "Circuit open, failing fast");
                return Err(ClientError::CircuitOpen {
                    destination,
                    retry_in_ms: retry_in.as_millis() as u64,
                });
            }
            let probing = decision == BreakerDecision::Probe;
            attempts += 1;

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if probing {
                        self.breakers.release_probe(&destination);
                    }
                    return Err(ClientError::Cancelled);
                }
                result = with_deadline(policy.timeout_ms, self.http.execute(request)) => result,
            };

            let retry_after = match sent {
                Ok(Ok(response)) => {
                    let status = response.status();
                    if status.is_success() {
                        self.breakers.record_success(&destination);
                        metrics::record_attempt(&destination, "success");
                        return Ok(Outcome::Success(response));
                    }

                    if status.is_server_error() {
                        self.breakers.record_failure(&destination);
                    } else if status == StatusCode::TOO_MANY_REQUESTS {
                        if probing {
                            self.breakers.release_probe(&destination);
                        }
                    } else {
                        // The destination is up; the request itself was refused.
                        self.breakers.record_success(&destination);
                    }

                    if !options.permits_retry(&response) {
                        metrics::record_attempt(&destination, "final");
                        return Ok(Outcome::Final(response));
                    }

                    metrics::record_attempt(&destination, "retryable_status");
                    tracing::warn!(
                        destination = %destination,
                        attempt,
                        status = %status,
                        "Retryable upstream response"
                    );
                    let hint = if status == StatusCode::TOO_MANY_REQUESTS {
                        parse_retry_after(response.headers())
                    } else {
                        None
                    };
                    last = Some(LastFailure::Response(response));
                    hint
                }
                Ok(Err(e)) => {
                    let err = classify_transport_error(&e, policy.timeout_ms);
                    if !err.is_retryable() {
                        // Only timeouts are non-retryable here. They never count against the breaker.
                        if probing {
                            self.breakers.release_probe(&destination);
                        }
                        metrics::record_attempt(&destination, "timeout");
                        return Err(err.into());
                    }
                    self.breakers.record_failure(&destination);
                    metrics::record_attempt(&destination, "network_error");
                    tracing::warn!(destination = %destination, attempt, error = %e, "Upstream network error");
                    last = Some(LastFailure::Error(err));
                    None
                }
                Err(timeout) => {
                    if probing {
                        self.breakers.release_probe(&destination);
                    }
                    metrics::record_attempt(&destination, "timeout");
                    tracing::warn!(destination = %destination, attempt, error = %timeout, "Upstream attempt timed out");
                    return Err(timeout.into());
                }
            };

            if attempt + 1 >= policy.max_attempts {
                break;
            }
            if pending.is_none() {
                tracing::debug!(destination = %destination, "Request body not replayable, not retrying");
                break;
            }

            let delay = next_delay(attempt, policy.initial_delay_ms, &self.defaults, retry_after);
            metrics::record_retry(&destination);
            tracing::info!(
                destination = %destination,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying request"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        match last {
            Some(LastFailure::Response(response)) => {
                tracing::warn!(
                    destination = %destination,
                    attempts,
                    status = %response.status(),
                    "Retries exhausted"
                );
                Ok(Outcome::Exhausted { response, attempts })
            }
            Some(LastFailure::Error(err)) => {
                tracing::warn!(destination = %destination, attempts, error = %err, "Retries exhausted");
                Err(err.into())
            }
            None => Err(ClientError::InvalidRequest("no attempt was made".to_string())),
        }
    }
}

fn classify_transport_error(e: &reqwest::Error, timeout_ms: Option<u64>) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            timeout_ms: timeout_ms.unwrap_or_default(),
        }
    } else {
        FetchError::Network {
            message: e.to_string(),
        }
    }
}

/// Turn a non-2xx response into its taxonomy variant.
pub async fn classify_response(response: Response) -> FetchError {
    let status = response.status();
    let retry_after_ms = if status == StatusCode::TOO_MANY_REQUESTS {
        parse_retry_after(response.headers()).map(|d: Duration| d.as_millis() as u64)
    } else {
        None
    };
    let mut message = response.text().await.unwrap_or_default();
    if message.is_empty() {
        message = status.canonical_reason().unwrap_or("").to_string();
    } else if message.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    FetchError::from_status(status, message, retry_after_ms)
}
