//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing upstreams)
//! - Validate value ranges (attempts, thresholds, timeouts)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use url::Url;

use crate::config::schema::GatewayConfig;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("upstream name {0:?} is defined more than once")]
    DuplicateUpstream(String),

    #[error("upstream {name}: invalid address {address:?}")]
    InvalidAddress { name: String, address: String },

    #[error("upstream {0}: retry.max_attempts must be at least 1")]
    ZeroAttempts(String),

    #[error("upstream {0}: retry.backoff_base must be a finite number >= 1.0")]
    InvalidBackoffBase(String),

    #[error("upstream {0}: circuit_breaker.failure_threshold must be at least 1")]
    ZeroFailureThreshold(String),

    #[error("upstream {0}: circuit_breaker.open_duration_secs must be greater than 0")]
    ZeroOpenDuration(String),

    #[error("route {route} references unknown upstream {upstream}")]
    UnknownUpstream { route: String, upstream: String },

    #[error("timeouts.request_secs must be greater than 0")]
    ZeroRequestTimeout,

    #[error("limits.max_body_bytes must be greater than 0")]
    ZeroBodyLimit,
}

/// Check a parsed config for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();

    for upstream in &config.upstreams {
        if !names.insert(upstream.name.as_str()) {
            errors.push(ValidationError::DuplicateUpstream(upstream.name.clone()));
        }

        let address_ok = Url::parse(&upstream.address)
            .map(|url| matches!(url.scheme(), "http") && url.host().is_some())
            .unwrap_or(false);
        if !address_ok {
            errors.push(ValidationError::InvalidAddress {
                name: upstream.name.clone(),
                address: upstream.address.clone(),
            });
        }

        if upstream.retry.max_attempts == 0 {
            errors.push(ValidationError::ZeroAttempts(upstream.name.clone()));
        }
        let base = upstream.retry.backoff_base;
        if !base.is_finite() || base < 1.0 {
            errors.push(ValidationError::InvalidBackoffBase(upstream.name.clone()));
        }
        if upstream.circuit_breaker.failure_threshold == 0 {
            errors.push(ValidationError::ZeroFailureThreshold(upstream.name.clone()));
        }
        if upstream.circuit_breaker.open_duration_secs == 0 {
            errors.push(ValidationError::ZeroOpenDuration(upstream.name.clone()));
        }
    }

    for route in &config.routes {
        if !names.contains(route.upstream.as_str()) {
            errors.push(ValidationError::UnknownUpstream {
                route: route.name.clone(),
                upstream: route.upstream.clone(),
            });
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
