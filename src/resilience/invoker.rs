//! Resilient call wrapper, one per upstream.
//!
//! ```text
//! call(request)
//!     → breaker.try_acquire()?      no → FatalFailure(CircuitOpen), transport untouched
//!     → retry.execute(transport.send)
//!     → settle the permit once:     Success → report_success_with
//!                                   TransientFailure → report_failure_with
//!                                   FatalFailure → neither (probe slot released)
//! ```

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::observability::metrics;
use crate::resilience::circuit_breaker::{CircuitBreaker, Permit};
use crate::resilience::outcome::{CallOutcome, Failure};
use crate::resilience::retries::RetryPolicy;
use crate::upstream::message::UpstreamRequest;
use crate::upstream::transport::Transport;

/// Breaker plus retry policy around one upstream's transport.
#[derive(Debug)]
pub struct ResilientInvoker {
    upstream: String,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    transport: Arc<dyn Transport>,
}

impl ResilientInvoker {
    pub fn new(
        upstream: impl Into<String>,
        breaker: CircuitBreaker,
        retry: RetryPolicy,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            upstream: upstream.into(),
            breaker,
            retry,
            transport,
        }
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Perform one logical upstream call.
    pub async fn call(&self, request: &UpstreamRequest, cancel: &CancellationToken) -> CallOutcome {
        let Some(permit) = self.breaker.try_acquire() else {
            tracing::debug!(upstream = %self.upstream, "Circuit open, failing fast");
            metrics::record_upstream_call(&self.upstream, "circuit_open");
            return CallOutcome::FatalFailure(Failure::CircuitOpen);
        };

        let started = Instant::now();
        // Released on drop unless reported, so a dropped call never strands the probe slot.
        let mut admission = Admission::new(&self.breaker, permit);

        let transport = &self.transport;
        let outcome = self
            .retry
            .execute(cancel, |attempt| {
                tracing::trace!(upstream = %self.upstream, attempt, "Sending upstream attempt");
                transport.send(request)
            })
            .await;

        match &outcome {
            CallOutcome::Success(_) => admission.success(),
            CallOutcome::TransientFailure(_) => admission.failure(),
            CallOutcome::FatalFailure(_) => {}
        }

        tracing::debug!(
            upstream = %self.upstream,
            outcome = outcome.label(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Upstream call finished"
        );
        metrics::record_upstream_call(&self.upstream, outcome.label());
        outcome
    }
}

/// Tracks whether an admitted call reported to the breaker.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    permit: Permit,
    reported: bool,
}

impl<'a> Admission<'a> {
    fn new(breaker: &'a CircuitBreaker, permit: Permit) -> Self {
        Self {
            breaker,
            permit,
            reported: false,
        }
    }

    fn success(&mut self) {
        self.reported = true;
        self.breaker.report_success_with(self.permit);
    }

    fn failure(&mut self) {
        self.reported = true;
        self.breaker.report_failure_with(self.permit);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.reported {
            self.breaker.release(self.permit);
        }
    }
}
