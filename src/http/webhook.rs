//! Inbound webhook events.
//!
//! # Responsibilities
//! - Run each event through admission control (dedup, rate limit, idempotency)
//! - Hand admitted events to an [`EventHandler`]
//! - Always acknowledge, so the webhook source does not redeliver
//!
//! # Data Flow
//! ```text
//! POST /events (InboundEvent)
//!     → EventPipeline::process
//!         → dedup → rate limit → idempotency claim → handler
//!     → 200 EventAck { status, message? }
//! ```
//!
//! # Design Decisions
//! - A failing handler is reported in the ack body, never as a non-2xx status
//! - Only timeouts get a specific user-facing message
//! - The handler runs under a budget shorter than the listener timeout, so an
//!   overrun still produces an ack and releases its idempotency claim

use async_trait::async_trait;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::admission::{Admission, Guarded, OperationState};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;
use crate::resilience::{ClientError, ClientResult, ResilientClient, RetryOptions};

pub const TIMEOUT_MESSAGE: &str = "Sorry, that took too long. Please try again.";
pub const GENERIC_FAILURE_MESSAGE: &str = "Sorry, something went wrong. Please try again later.";
pub const RATE_LIMITED_MESSAGE: &str = "You're sending commands too quickly. Please wait a moment.";

/// An event delivered by the upstream webhook source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub event_id: String,
    pub user_id: String,
    /// Command class used for rate limiting.
    pub command: String,
    /// Present when the event triggers a side effect that must run once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Processed,
    Duplicate,
    RateLimited,
    InProgress,
    Failed,
}

impl AckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckStatus::Processed => "processed",
            AckStatus::Duplicate => "duplicate",
            AckStatus::RateLimited => "rate_limited",
            AckStatus::InProgress => "in_progress",
            AckStatus::Failed => "failed",
        }
    }
}

/// Response body for every accepted delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAck {
    pub status: AckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EventAck {
    pub fn new(status: AckStatus) -> Self {
        Self {
            status,
            message: None,
        }
    }

    pub fn with_message(status: AckStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
        }
    }
}

/// User-facing text for a failed event.
pub fn failure_message(error: &ClientError) -> &'static str {
    if error.is_timeout() {
        TIMEOUT_MESSAGE
    } else {
        GENERIC_FAILURE_MESSAGE
    }
}

/// Does the work for an admitted event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &InboundEvent) -> ClientResult<()>;
}

/// Forwards each event as JSON to a downstream URL through the resilient client.
pub struct ForwardingHandler {
    client: ResilientClient,
    url: String,
    options: RetryOptions,
}

impl ForwardingHandler {
    pub fn new(client: ResilientClient, url: impl Into<String>, options: RetryOptions) -> Self {
        Self {
            client,
            url: url.into(),
            options,
        }
    }
}

#[async_trait]
impl EventHandler for ForwardingHandler {
    async fn handle(&self, event: &InboundEvent) -> ClientResult<()> {
        let response = self.client.post_json(&self.url, event, &self.options).await?;
        tracing::debug!(
            event_id = %event.event_id,
            status = %response.status(),
            "Event forwarded"
        );
        Ok(())
    }
}

/// Accepts every event without side effects.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcknowledgeHandler;

#[async_trait]
impl EventHandler for AcknowledgeHandler {
    async fn handle(&self, event: &InboundEvent) -> ClientResult<()> {
        tracing::debug!(event_id = %event.event_id, "Event acknowledged");
        Ok(())
    }
}

/// Admission control followed by the handler.
#[derive(Clone)]
pub struct EventPipeline {
    admission: Admission,
    handler: Arc<dyn EventHandler>,
    handler_budget: Duration,
}

impl EventPipeline {
    pub fn new(admission: Admission, handler: Arc<dyn EventHandler>, handler_budget: Duration) -> Self {
        Self {
            admission,
            handler,
            handler_budget,
        }
    }

    /// Budget for a listener timeout of `request_timeout`: a tenth of it is
    /// held back for the ack, capped at one second.
    pub fn budget_for(request_timeout: Duration) -> Duration {
        let reserve = (request_timeout / 10).min(Duration::from_secs(1));
        request_timeout.saturating_sub(reserve)
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    async fn handle_within_budget(&self, event: &InboundEvent) -> ClientResult<()> {
        let budget_ms = u64::try_from(self.handler_budget.as_millis()).unwrap_or(u64::MAX);
        with_deadline(Some(budget_ms), self.handler.handle(event))
            .await
            .map_err(ClientError::from)
            .and_then(|result| result)
    }

    pub async fn process(&self, event: &InboundEvent) -> EventAck {
        if self.admission.dedup.is_duplicate(&event.event_id).await {
            return EventAck::new(AckStatus::Duplicate);
        }

        if self
            .admission
            .rate_limiter
            .is_rate_limited(&event.user_id, &event.command)
            .await
        {
            return EventAck::with_message(AckStatus::RateLimited, RATE_LIMITED_MESSAGE);
        }

        let result = match &event.operation_id {
            Some(operation_id) => {
                let guard = &self.admission.idempotency;
                match guard.run(operation_id, || self.handle_within_budget(event)).await {
                    Ok(Guarded::Ran(())) => Ok(AckStatus::Processed),
                    Ok(Guarded::Skipped) => match guard.operation_state(operation_id).await {
                        Some(OperationState::Completed) => Ok(AckStatus::Duplicate),
                        _ => Ok(AckStatus::InProgress),
                    },
                    Err(e) => Err(e),
                }
            }
            None => self.handle_within_budget(event).await.map(|()| AckStatus::Processed),
        };

        match result {
            Ok(status) => EventAck::new(status),
            Err(e) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    user_id = %event.user_id,
                    error = %e,
                    kind = e.kind(),
                    "Event handling failed"
                );
                EventAck::with_message(AckStatus::Failed, failure_message(&e))
            }
        }
    }
}

/// `POST /events`
pub async fn receive_event(
    State(state): State<AppState>,
    Json(event): Json<InboundEvent>,
) -> Json<EventAck> {
    let start = Instant::now();
    let ack = state.pipeline.process(&event).await;
    tracing::info!(
        event_id = %event.event_id,
        user_id = %event.user_id,
        command = %event.command,
        status = ack.status.as_str(),
        "Event received"
    );
    metrics::record_webhook(ack.status.as_str(), start);
    Json(ack)
}
