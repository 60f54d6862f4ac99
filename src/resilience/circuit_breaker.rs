//! Circuit breaker for outbound destinations.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: destination assumed down, requests fail fast
//! - Half-Open (opt-in): one trial request decides whether to close
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold (consecutive)
//! Open → Closed: cooldown elapsed since last failure (default)
//! Open → Half-Open: cooldown elapsed, half_open_probe enabled
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails
//! ```
//!
//! # Design Decisions
//! - Per-destination breaker, process-local, never shared across processes
//! - Owned by the client that uses it rather than a global
//! - Bounded: at capacity the stalest closed entry is evicted

use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;

use crate::clock::SharedClock;
use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Whether a call to a destination may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    /// Normal request.
    Allowed,
    /// The single trial request of a half-open breaker.
    Probe,
    /// Fail fast without touching the network.
    Rejected { retry_in: Duration },
}

impl BreakerDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, BreakerDecision::Rejected { .. })
    }
}

#[derive(Debug, Clone, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_ms: u64,
    is_open: bool,
    probe_started_ms: Option<u64>,
}

/// Point-in-time view of one destination, for admin output.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub destination: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub retry_in_ms: u64,
}

/// Registry of breakers keyed by normalized destination.
pub struct CircuitBreakerRegistry {
    states: DashMap<String, BreakerState>,
    config: CircuitBreakerConfig,
    clock: SharedClock,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        Self {
            states: DashMap::new(),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn remaining_cooldown(&self, state: &BreakerState, now: u64) -> Option<u64> {
        let elapsed = now.saturating_sub(state.last_failure_ms);
        (elapsed < self.config.cooldown_ms).then(|| self.config.cooldown_ms - elapsed)
    }

    /// Decide whether a call to `destination` may go out.
    pub fn check(&self, destination: &str) -> BreakerDecision {
        let now = self.clock.now_millis();
        let Some(mut state) = self.states.get_mut(destination) else {
            return BreakerDecision::Allowed;
        };

        if !state.is_open {
            return BreakerDecision::Allowed;
        }

        if let Some(remaining) = self.remaining_cooldown(&state, now) {
            metrics::record_circuit_rejected(destination);
            return BreakerDecision::Rejected {
                retry_in: Duration::from_millis(remaining),
            };
        }

        if !self.config.half_open_probe {
            state.is_open = false;
            state.failure_count = 0;
            tracing::info!(destination = %destination, "Circuit closed after cooldown");
            return BreakerDecision::Allowed;
        }

        // A probe that never reported back is abandoned after one cooldown.
        if let Some(started) = state.probe_started_ms {
            if now.saturating_sub(started) < self.config.cooldown_ms {
                metrics::record_circuit_rejected(destination);
                return BreakerDecision::Rejected {
                    retry_in: Duration::ZERO,
                };
            }
        }

        state.probe_started_ms = Some(now);
        tracing::info!(destination = %destination, "Circuit half-open, admitting probe");
        BreakerDecision::Probe
    }

    /// Record a healthy outcome, closing the breaker.
    pub fn record_success(&self, destination: &str) {
        if let Some(mut state) = self.states.get_mut(destination) {
            if state.is_open {
                tracing::info!(destination = %destination, "Circuit closed after successful probe");
            }
            state.failure_count = 0;
            state.is_open = false;
            state.probe_started_ms = None;
        }
    }

    /// Record a failed outcome, opening the breaker at the threshold.
    pub fn record_failure(&self, destination: &str) {
        let now = self.clock.now_millis();
        if !self.states.contains_key(destination) {
            self.make_room();
        }

        let mut state = self.states.entry(destination.to_string()).or_default();
        state.last_failure_ms = now;

        if state.probe_started_ms.take().is_some() {
            state.is_open = true;
            state.failure_count = state.failure_count.max(self.config.failure_threshold);
            tracing::warn!(destination = %destination, "Probe failed, circuit reopened");
            metrics::record_circuit_opened(destination);
            return;
        }

        state.failure_count = state.failure_count.saturating_add(1);
        if !state.is_open && state.failure_count >= self.config.failure_threshold {
            state.is_open = true;
            tracing::warn!(
                destination = %destination,
                failures = state.failure_count,
                cooldown_ms = self.config.cooldown_ms,
                "Circuit opened"
            );
            metrics::record_circuit_opened(destination);
        }
    }

    /// Give up an admitted probe without a verdict, e.g. on cancellation.
    pub fn release_probe(&self, destination: &str) {
        if let Some(mut state) = self.states.get_mut(destination) {
            state.probe_started_ms = None;
        }
    }

    /// Current state of one destination.
    pub fn state(&self, destination: &str) -> CircuitState {
        let now = self.clock.now_millis();
        match self.states.get(destination) {
            Some(state) => self.classify(&state, now),
            None => CircuitState::Closed,
        }
    }

    fn classify(&self, state: &BreakerState, now: u64) -> CircuitState {
        if !state.is_open {
            CircuitState::Closed
        } else if self.remaining_cooldown(state, now).is_some() {
            CircuitState::Open
        } else if self.config.half_open_probe {
            CircuitState::HalfOpen
        } else {
            CircuitState::Closed
        }
    }

    /// Snapshot of every tracked destination.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let now = self.clock.now_millis();
        let mut out: Vec<BreakerSnapshot> = self
            .states
            .iter()
            .map(|entry| {
                let state = entry.value();
                BreakerSnapshot {
                    destination: entry.key().clone(),
                    state: self.classify(state, now),
                    failure_count: state.failure_count,
                    retry_in_ms: if state.is_open {
                        self.remaining_cooldown(state, now).unwrap_or(0)
                    } else {
                        0
                    },
                }
            })
            .collect();
        out.sort_by(|a, b| a.destination.cmp(&b.destination));
        out
    }

    /// Number of tracked destinations.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn make_room(&self) {
        if self.states.len() < self.config.max_destinations {
            return;
        }
        let victim = self
            .states
            .iter()
            .filter(|e| !e.value().is_open)
            .min_by_key(|e| e.value().last_failure_ms)
            .map(|e| e.key().clone());
        match victim {
            Some(key) => {
                self.states.remove(&key);
            }
            None => {
                tracing::warn!(
                    max_destinations = self.config.max_destinations,
                    "Breaker registry full of open circuits, growing past bound"
                );
            }
        }
    }
}

/// Normalize a URL to its breaker key: `scheme://host[:port]`.
pub fn destination_key(url: &url::Url) -> String {
    let host = url.host_str().unwrap_or("");
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}
