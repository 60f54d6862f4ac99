//! Per-user, per-command fixed-window rate limiting.
//!
//! Windows live in the shared store under `{prefix}{command_class}:{user_id}`
//! as JSON and expire with the window.
//!
//! The read-modify-write is not atomic. Two invocations racing on the same
//! key can both read `count = n` and both write `n + 1`, so a user can exceed
//! the limit by at most the number of concurrent invocations per window.
//! A burst straddling a window boundary can reach twice the limit.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::clock::SharedClock;
use crate::config::{RateLimitConfig, DEFAULT_COMMAND_CLASS};
use crate::observability::metrics;
use crate::store::{namespaced, SharedStore, StoreError, StoreResult};

/// Limit used when the config has no `default` entry.
const FALLBACK_LIMIT: u32 = 20;

/// Persisted window state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    pub count: u32,
    pub window_reset_at_ms: u64,
}

/// Result of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_limited(&self) -> bool {
        matches!(self, RateLimitDecision::Limited { .. })
    }
}

/// Fixed-window limiter backed by the shared store.
#[derive(Clone)]
pub struct RateLimiter {
    store: SharedStore,
    config: RateLimitConfig,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(store: SharedStore, config: RateLimitConfig, clock: SharedClock) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Configured limit for `command_class`, falling back to `default`.
    pub fn limit_for(&self, command_class: &str) -> u32 {
        self.config
            .limits
            .get(command_class)
            .or_else(|| self.config.limits.get(DEFAULT_COMMAND_CLASS))
            .copied()
            .unwrap_or(FALLBACK_LIMIT)
    }

    fn key(&self, user_id: &str, command_class: &str) -> String {
        namespaced(&self.config.key_prefix, &format!("{command_class}:{user_id}"))
    }

    /// True when this action must be refused.
    pub async fn is_rate_limited(&self, user_id: &str, command_class: &str) -> bool {
        self.check(user_id, command_class).await.is_limited()
    }

    /// Count one action and report whether it is allowed.
    ///
    /// Store failures are logged and the action is allowed.
    pub async fn check(&self, user_id: &str, command_class: &str) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision::Allowed { remaining: u32::MAX };
        }

        match self.try_check(user_id, command_class).await {
            Ok(decision) => {
                if let RateLimitDecision::Limited { retry_after } = decision {
                    tracing::warn!(
                        user_id = %user_id,
                        command_class = %command_class,
                        retry_after = ?retry_after,
                        "Rate limit exceeded"
                    );
                    metrics::record_rate_limited(command_class);
                }
                decision
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    command_class = %command_class,
                    error = %e,
                    "Rate limit check failed, allowing"
                );
                RateLimitDecision::Allowed { remaining: 0 }
            }
        }
    }

    async fn try_check(&self, user_id: &str, command_class: &str) -> StoreResult<RateLimitDecision> {
        let key = self.key(user_id, command_class);
        let limit = self.limit_for(command_class);
        let now = self.clock.now_millis();

        let current = match self.store.get(&key).await? {
            Some(raw) => Some(serde_json::from_str::<RateLimitWindow>(&raw).map_err(|e| {
                StoreError::Corrupt {
                    key: key.clone(),
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };

        match current {
            Some(window) if window.window_reset_at_ms > now => {
                if window.count >= limit {
                    return Ok(RateLimitDecision::Limited {
                        retry_after: Duration::from_millis(window.window_reset_at_ms - now),
                    });
                }
                let next = RateLimitWindow {
                    count: window.count + 1,
                    window_reset_at_ms: window.window_reset_at_ms,
                };
                let ttl_secs = (window.window_reset_at_ms - now).div_ceil(1000);
                self.write(&key, &next, ttl_secs).await?;
                Ok(RateLimitDecision::Allowed {
                    remaining: limit - next.count,
                })
            }
            _ => {
                let window_ms = self.config.window_secs.saturating_mul(1000);
                let fresh = RateLimitWindow {
                    count: 1,
                    window_reset_at_ms: now.saturating_add(window_ms),
                };
                self.write(&key, &fresh, self.config.window_secs).await?;
                Ok(RateLimitDecision::Allowed {
                    remaining: limit.saturating_sub(1),
                })
            }
        }
    }

    async fn write(&self, key: &str, window: &RateLimitWindow, ttl_secs: u64) -> StoreResult<()> {
        let raw = serde_json::to_string(window).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.store.put(key, &raw, ttl_secs.max(1)).await
    }
}
