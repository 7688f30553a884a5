//! Upstream registry.
//!
//! # Responsibilities
//! - Build one resilient invoker per configured upstream at startup
//! - Look invokers up by upstream name for every request
//!
//! Immutable after construction and shared via `Arc`, so lookups need no locking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::config::{TimeoutConfig, UpstreamConfig};
use crate::error::GatewayError;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::clock::SharedClock;
use crate::resilience::invoker::ResilientInvoker;
use crate::resilience::retries::RetryPolicy;
use crate::upstream::transport::{build_client, HttpTransport, Transport};

/// Map of upstream name to its resilient invoker.
#[derive(Debug, Default)]
pub struct UpstreamRegistry {
    invokers: HashMap<String, Arc<ResilientInvoker>>,
}

impl UpstreamRegistry {
    /// Build HTTP-backed invokers for every configured upstream.
    pub fn from_config(
        upstreams: &[UpstreamConfig],
        timeouts: &TimeoutConfig,
        clock: SharedClock,
    ) -> Result<Self, GatewayError> {
        let client = build_client(Duration::from_secs(timeouts.connect_secs));
        let mut registry = Self::default();

        for upstream in upstreams {
            let base = Url::parse(&upstream.address).map_err(|e| GatewayError::InvalidUpstream {
                name: upstream.name.clone(),
                reason: e.to_string(),
            })?;
            let transport = Arc::new(HttpTransport::new(client.clone(), base));
            registry.insert_with_transport(upstream, transport, clock.clone());

            tracing::info!(
                upstream = %upstream.name,
                address = %upstream.address,
                max_attempts = upstream.retry.max_attempts,
                failure_threshold = upstream.circuit_breaker.failure_threshold,
                open_duration_secs = upstream.circuit_breaker.open_duration_secs,
                "Registered upstream"
            );
        }

        Ok(registry)
    }

    /// Register an upstream with an explicit transport.
    pub fn insert_with_transport(
        &mut self,
        upstream: &UpstreamConfig,
        transport: Arc<dyn Transport>,
        clock: SharedClock,
    ) {
        let breaker =
            CircuitBreaker::from_config(&upstream.name, &upstream.circuit_breaker, clock.clone());
        let retry = RetryPolicy::from_config(&upstream.name, &upstream.retry, clock);
        let invoker = ResilientInvoker::new(&upstream.name, breaker, retry, transport);
        self.invokers.insert(upstream.name.clone(), Arc::new(invoker));
    }

    pub fn get(&self, name: &str) -> Option<Arc<ResilientInvoker>> {
        self.invokers.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.invokers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invokers.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.invokers.keys().map(String::as_str)
    }
}
