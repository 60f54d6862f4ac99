//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the edge
//! process. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the fallback entry in [`RateLimitConfig::limits`].
pub const DEFAULT_COMMAND_CLASS: &str = "default";

/// Root configuration for the edge process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EdgeConfig {
    /// Listener configuration (bind address, request deadline).
    pub listener: ListenerConfig,

    /// Outbound retry defaults.
    pub retries: RetryConfig,

    /// Per-destination circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Per-user, per-command rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Inbound event deduplication.
    pub dedup: DedupConfig,

    /// Operation-level idempotency.
    pub idempotency: IdempotencyConfig,

    /// Key-value store settings.
    pub store: StoreConfig,

    /// Where accepted events are forwarded.
    pub downstream: DownstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin endpoints.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Deadline for a whole inbound request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Jitter applied on top of the exponential delay.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Jitter {
    /// Exact `initial * 2^attempt`.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// `delay / 2` plus uniform in `[0, delay / 2]`.
    Equal,
}

/// Retry configuration for outbound calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub initial_delay_ms: u64,

    /// Cap on a single computed backoff delay in milliseconds.
    pub max_delay_ms: u64,

    /// Cap on a server-provided `retry-after` delay in milliseconds.
    pub max_retry_after_ms: u64,

    /// Per-attempt deadline in milliseconds. None = no deadline.
    pub timeout_ms: Option<u64>,

    /// Jitter mode.
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            max_retry_after_ms: 120_000,
            timeout_ms: None,
            jitter: Jitter::None,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// How long an open circuit rejects calls, measured from the last failure.
    pub cooldown_ms: u64,

    /// Admit a single trial request after cooldown instead of fully closing.
    pub half_open_probe: bool,

    /// Upper bound on tracked destinations.
    pub max_destinations: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 60_000,
            half_open_probe: false,
            max_destinations: 1024,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Fixed window length in seconds.
    pub window_secs: u64,

    /// Store key prefix.
    pub key_prefix: String,

    /// Requests per window by command class; `default` covers the rest.
    pub limits: BTreeMap<String, u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut limits = BTreeMap::new();
        limits.insert(DEFAULT_COMMAND_CLASS.to_string(), 20);
        Self {
            enabled: true,
            window_secs: 60,
            key_prefix: "ratelimit:".to_string(),
            limits,
        }
    }
}

/// Event deduplication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Enable deduplication.
    pub enabled: bool,

    /// Marker lifetime; must exceed the upstream redelivery window.
    pub ttl_secs: u64,

    /// Store key prefix.
    pub key_prefix: String,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 60,
            key_prefix: "dedup:".to_string(),
        }
    }
}

/// Idempotency guard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// Marker lifetime; must outlive plausible client retries.
    pub ttl_secs: u64,

    /// Store key prefix.
    pub key_prefix: String,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            key_prefix: "idempotency:".to_string(),
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How often expired entries are purged from the in-memory store.
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
        }
    }
}

/// Downstream target for accepted events.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DownstreamConfig {
    /// URL events are POSTed to. None = acknowledge only.
    pub url: Option<String>,

    /// Per-attempt deadline override in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount `/admin/*` routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}
