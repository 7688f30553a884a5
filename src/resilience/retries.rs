//! Retry logic.
//!
//! # Responsibilities
//! - Re-run an attempt while it ends in a retryable transient failure
//! - Wait `backoff(n)` before the n-th retry, through the injected clock
//! - Abort promptly when the caller's cancellation token fires
//!
//! # Design Decisions
//! - `max_attempts` counts the first attempt, so 1 means no retries
//! - Fatal failures and successes return immediately
//! - When attempts run out the last transient failure is the result
//! - The policy holds no per-call state and is shared by every call to one upstream

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;
use crate::resilience::clock::SharedClock;
use crate::resilience::outcome::{CallOutcome, Failure};

type RetryPredicate = Arc<dyn Fn(&CallOutcome) -> bool + Send + Sync>;

/// Bounded retry with backoff.
#[derive(Clone)]
pub struct RetryPolicy {
    upstream: String,
    max_attempts: u32,
    backoff: Backoff,
    retryable: RetryPredicate,
    clock: SharedClock,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("upstream", &self.upstream)
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new(
        upstream: impl Into<String>,
        max_attempts: u32,
        backoff: Backoff,
        clock: SharedClock,
    ) -> Self {
        Self {
            upstream: upstream.into(),
            max_attempts: max_attempts.max(1),
            backoff,
            retryable: Arc::new(CallOutcome::is_transient),
            clock,
        }
    }

    pub fn from_config(
        upstream: impl Into<String>,
        config: &RetryConfig,
        clock: SharedClock,
    ) -> Self {
        Self::new(upstream, config.max_attempts, Backoff::from_config(config), clock)
    }

    /// Narrow which transient failures are retried.
    ///
    /// Only consulted for transient failures; fatal ones are never retried.
    pub fn with_retryable<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CallOutcome) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `attempt_fn` until it succeeds, fails fatally, or attempts run out.
    ///
    /// `attempt_fn` receives the 1-based attempt number. If `cancel` fires
    /// during an attempt or a backoff sleep the call resolves as
    /// `FatalFailure(Cancelled)` without another attempt.
    pub async fn execute<F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut attempt_fn: F,
    ) -> CallOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = CallOutcome>,
    {
        let mut attempt: u32 = 1;

        loop {
            if cancel.is_cancelled() {
                return CallOutcome::FatalFailure(Failure::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return CallOutcome::FatalFailure(Failure::Cancelled),
                outcome = attempt_fn(attempt) => outcome,
            };

            if !outcome.is_transient() || !(self.retryable)(&outcome) {
                return outcome;
            }

            if attempt >= self.max_attempts {
                tracing::warn!(
                    upstream = %self.upstream,
                    attempts = attempt,
                    outcome = outcome.label(),
                    "Retries exhausted"
                );
                return outcome;
            }

            let delay = self.backoff.delay(attempt);
            tracing::warn!(
                upstream = %self.upstream,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying after transient failure"
            );
            metrics::record_retry(&self.upstream);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return CallOutcome::FatalFailure(Failure::Cancelled),
                _ = self.clock.sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::ManualClock;
    use crate::upstream::message::UpstreamResponse;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn policy(max_attempts: u32, clock: &ManualClock) -> RetryPolicy {
        RetryPolicy::new(
            "orders",
            max_attempts,
            Backoff::exponential(2.0, Duration::from_millis(100), Duration::from_secs(60)),
            Arc::new(clock.clone()),
        )
    }

    fn transient() -> CallOutcome {
        CallOutcome::TransientFailure(Failure::Status(UpstreamResponse::new(
            StatusCode::SERVICE_UNAVAILABLE,
        )))
    }

    fn ok() -> CallOutcome {
        CallOutcome::Success(UpstreamResponse::new(StatusCode::OK))
    }

    #[tokio::test]
    async fn test_always_transient_runs_max_attempts() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);

        let outcome = policy(4, &clock)
            .execute(&CancellationToken::new(), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    CallOutcome::TransientFailure(Failure::Transport(format!("reset #{attempt}")))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match outcome {
            CallOutcome::TransientFailure(Failure::Transport(reason)) => {
                assert_eq!(reason, "reset #4")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
            ]
        );
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);

        let outcome = policy(3, &clock)
            .execute(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    CallOutcome::FatalFailure(Failure::Status(UpstreamResponse::new(
                        StatusCode::NOT_FOUND,
                    )))
                }
            })
            .await;

        assert!(outcome.is_fatal());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);

        let outcome = policy(3, &clock)
            .execute(&CancellationToken::new(), |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n < 2 { transient() } else { ok() } }
            })
            .await;

        assert!(outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[tokio::test]
    async fn test_single_attempt_never_sleeps() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);

        let outcome = policy(1, &clock)
            .execute(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { transient() }
            })
            .await;

        assert!(outcome.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_zero_attempts_is_clamped_to_one() {
        let clock = ManualClock::new();
        assert_eq!(policy(0, &clock).max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_predicate_can_veto_retry() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);

        let outcome = policy(5, &clock)
            .with_retryable(|outcome| {
                !matches!(outcome, CallOutcome::TransientFailure(Failure::Transport(_)))
            })
            .execute(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { CallOutcome::TransientFailure(Failure::Transport("refused".into())) }
            })
            .await;

        assert!(outcome.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_stops_retrying() {
        let clock = ManualClock::new();
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let outcome = policy(5, &clock)
            .execute(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                // Request is abandoned while this attempt is in flight.
                cancel.cancel();
                async { transient() }
            })
            .await;

        assert!(matches!(outcome, CallOutcome::FatalFailure(Failure::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_sleep() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::new(
            "orders",
            3,
            Backoff::constant(Duration::from_secs(3600)),
            Arc::new(crate::resilience::clock::SystemClock),
        );

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let outcome = policy.execute(&cancel, |_| async { transient() }).await;

        assert!(matches!(outcome, CallOutcome::FatalFailure(Failure::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_attempt() {
        let clock = ManualClock::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);

        let outcome = policy(3, &clock)
            .execute(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { ok() }
            })
            .await;

        assert!(matches!(outcome, CallOutcome::FatalFailure(Failure::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
