//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds, windows, TTLs > 0)
//! - Ensure store key namespaces are disjoint
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EdgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::EdgeConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be at least {min}")]
    TooSmall { field: &'static str, min: u64 },

    #[error("rate limit for command class '{0}' must be at least 1")]
    ZeroLimit(String),

    #[error("{field} must not be empty")]
    EmptyPrefix { field: &'static str },

    #[error("key prefixes overlap: '{0}' and '{1}'")]
    OverlappingPrefixes(String, String),

    #[error("invalid {field} '{value}': {reason}")]
    InvalidAddress {
        field: &'static str,
        value: String,
        reason: String,
    },
}

fn at_least(errors: &mut Vec<ValidationError>, field: &'static str, value: u64, min: u64) {
    if value < min {
        errors.push(ValidationError::TooSmall { field, min });
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &EdgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    at_least(&mut errors, "retries.max_retries", config.retries.max_retries as u64, 1);
    at_least(&mut errors, "retries.max_delay_ms", config.retries.max_delay_ms, 1);
    if let Some(timeout_ms) = config.retries.timeout_ms {
        at_least(&mut errors, "retries.timeout_ms", timeout_ms, 1);
    }
    at_least(
        &mut errors,
        "circuit_breaker.failure_threshold",
        config.circuit_breaker.failure_threshold as u64,
        1,
    );
    at_least(
        &mut errors,
        "circuit_breaker.max_destinations",
        config.circuit_breaker.max_destinations as u64,
        1,
    );
    at_least(&mut errors, "rate_limit.window_secs", config.rate_limit.window_secs, 1);
    at_least(&mut errors, "dedup.ttl_secs", config.dedup.ttl_secs, 1);
    at_least(&mut errors, "idempotency.ttl_secs", config.idempotency.ttl_secs, 1);
    at_least(&mut errors, "store.sweep_interval_secs", config.store.sweep_interval_secs, 1);
    at_least(&mut errors, "listener.request_timeout_secs", config.listener.request_timeout_secs, 1);

    for (class, limit) in &config.rate_limit.limits {
        if *limit == 0 {
            errors.push(ValidationError::ZeroLimit(class.clone()));
        }
    }

    let prefixes = [
        ("rate_limit.key_prefix", config.rate_limit.key_prefix.as_str()),
        ("dedup.key_prefix", config.dedup.key_prefix.as_str()),
        ("idempotency.key_prefix", config.idempotency.key_prefix.as_str()),
    ];
    for (field, prefix) in prefixes {
        if prefix.is_empty() {
            errors.push(ValidationError::EmptyPrefix { field });
        }
    }
    for (i, (_, a)) in prefixes.iter().enumerate() {
        for (_, b) in prefixes.iter().skip(i + 1) {
            if a.is_empty() || b.is_empty() {
                continue;
            }
            if a.starts_with(b) || b.starts_with(a) {
                errors.push(ValidationError::OverlappingPrefixes(a.to_string(), b.to_string()));
            }
        }
    }

    if let Err(e) = config.listener.bind_address.parse::<std::net::SocketAddr>() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
            reason: e.to_string(),
        });
    }
    if config.observability.metrics_enabled {
        if let Err(e) = config.observability.metrics_address.parse::<std::net::SocketAddr>() {
            errors.push(ValidationError::InvalidAddress {
                field: "observability.metrics_address",
                value: config.observability.metrics_address.clone(),
                reason: e.to_string(),
            });
        }
    }
    if let Some(url) = &config.downstream.url {
        if let Err(e) = url::Url::parse(url) {
            errors.push(ValidationError::InvalidAddress {
                field: "downstream.url",
                value: url.clone(),
                reason: e.to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&EdgeConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = EdgeConfig::default();
        config.retries.max_retries = 0;
        config.circuit_breaker.failure_threshold = 0;
        config.rate_limit.limits.insert("search".into(), 0);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::ZeroLimit("search".into())));
    }

    #[test]
    fn test_overlapping_prefixes_rejected() {
        let mut config = EdgeConfig::default();
        config.dedup.key_prefix = "rate".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::OverlappingPrefixes("ratelimit:".into(), "rate".into())]
        );
    }

    #[test]
    fn test_bad_downstream_url() {
        let mut config = EdgeConfig::default();
        config.downstream.url = Some("not a url".into());

        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(
            errors[0],
            ValidationError::InvalidAddress { field: "downstream.url", .. }
        ));
    }
}
