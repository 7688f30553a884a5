//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: upstream assumed down, calls fail fast
//! - Half-Open: a single probe tests whether the upstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: open_duration elapsed (first allow() takes the probe slot)
//! Half-Open → Closed: probe reports success
//! Half-Open → Open: probe reports failure (opened_at refreshed)
//! ```
//!
//! # Design Decisions
//! - One breaker per upstream, never global
//! - State, counters and opened_at live behind a single mutex
//! - At most one probe in flight while Half-Open
//! - Every transition is logged, counted and broadcast

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::broadcast;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::clock::SharedClock;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    /// Gauge encoding.
    pub fn as_gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What caused a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    FailureThresholdReached,
    OpenDurationElapsed,
    ProbeSucceeded,
    ProbeFailed,
}

impl TransitionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionReason::FailureThresholdReached => "failure_threshold_reached",
            TransitionReason::OpenDurationElapsed => "open_duration_elapsed",
            TransitionReason::ProbeSucceeded => "probe_succeeded",
            TransitionReason::ProbeFailed => "probe_failed",
        }
    }
}

/// Event published on every state change.
#[derive(Debug, Clone)]
pub struct BreakerTransition {
    pub upstream: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub reason: TransitionReason,
    pub timestamp: SystemTime,
}

/// Admission handed out by [`CircuitBreaker::try_acquire`].
///
/// Reports made through a permit only count while the breaker is still in
/// the state that issued it, so a call admitted while Closed cannot settle
/// a later Half-Open probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    generation: u64,
    probe: bool,
}

impl Permit {
    /// Whether this permit holds the Half-Open probe slot.
    pub fn is_probe(&self) -> bool {
        self.probe
    }
}

type Transition = (CircuitState, CircuitState, TransitionReason);

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    /// Bumped on every transition.
    generation: u64,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl BreakerState {
    /// Unscoped reports always apply; permits only within their generation.
    fn accepts(&self, permit: Option<Permit>) -> bool {
        match permit {
            None => true,
            Some(p) => {
                p.generation == self.generation
                    && (self.state != CircuitState::HalfOpen || p.probe)
            }
        }
    }

    fn move_to(&mut self, to: CircuitState, reason: TransitionReason) -> Transition {
        let from = self.state;
        self.state = to;
        self.generation = self.generation.wrapping_add(1);
        (from, to, reason)
    }
}

/// Per-upstream circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    upstream: String,
    failure_threshold: u32,
    open_duration: Duration,
    clock: SharedClock,
    inner: Mutex<BreakerState>,
    events: broadcast::Sender<BreakerTransition>,
}

impl CircuitBreaker {
    pub fn new(
        upstream: impl Into<String>,
        failure_threshold: u32,
        open_duration: Duration,
        clock: SharedClock,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        let breaker = Self {
            upstream: upstream.into(),
            failure_threshold: failure_threshold.max(1),
            open_duration,
            clock,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                generation: 0,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
            events,
        };
        metrics::set_circuit_state(&breaker.upstream, CircuitState::Closed);
        breaker
    }

    pub fn from_config(
        upstream: impl Into<String>,
        config: &CircuitBreakerConfig,
        clock: SharedClock,
    ) -> Self {
        Self::new(
            upstream,
            config.failure_threshold,
            Duration::from_secs(config.open_duration_secs),
            clock,
        )
    }

    /// Whether a call may be attempted now.
    ///
    /// In Open state the first caller after `open_duration` moves the breaker
    /// to Half-Open and takes the single probe slot; everyone else sees false
    /// until the probe resolves.
    pub fn allow(&self) -> bool {
        self.try_acquire().is_some()
    }

    /// Like [`allow`](Self::allow), returning the permit to settle the call with.
    pub fn try_acquire(&self) -> Option<Permit> {
        let mut transition = None;
        let permit = {
            let mut inner = self.lock();
            let state = inner.state;
            match state {
                CircuitState::Closed => Some(Permit {
                    generation: inner.generation,
                    probe: false,
                }),
                CircuitState::Open => {
                    let elapsed = inner
                        .opened_at
                        .map(|at| self.clock.now().saturating_duration_since(at))
                        .unwrap_or(self.open_duration);
                    if elapsed >= self.open_duration {
                        transition = Some(inner.move_to(
                            CircuitState::HalfOpen,
                            TransitionReason::OpenDurationElapsed,
                        ));
                        inner.probe_in_flight = true;
                        Some(Permit {
                            generation: inner.generation,
                            probe: true,
                        })
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen if inner.probe_in_flight => None,
                CircuitState::HalfOpen => {
                    inner.probe_in_flight = true;
                    Some(Permit {
                        generation: inner.generation,
                        probe: true,
                    })
                }
            }
        };
        self.publish(transition);
        permit
    }

    pub fn report_success(&self) {
        self.settle_success(None);
    }

    pub fn report_failure(&self) {
        self.settle_failure(None);
    }

    /// Report a success for the call admitted with `permit`.
    pub fn report_success_with(&self, permit: Permit) {
        self.settle_success(Some(permit));
    }

    /// Report a failure for the call admitted with `permit`.
    pub fn report_failure_with(&self, permit: Permit) {
        self.settle_failure(Some(permit));
    }

    /// Free the Half-Open probe slot held by `permit` without judging the upstream.
    ///
    /// Used when an admitted probe ends in a fatal failure or is cancelled.
    /// Permits that are not the current probe leave the breaker untouched.
    pub fn release(&self, permit: Permit) {
        let mut inner = self.lock();
        if permit.probe && inner.state == CircuitState::HalfOpen && inner.accepts(Some(permit)) {
            inner.probe_in_flight = false;
        }
    }

    fn settle_success(&self, permit: Option<Permit>) {
        let mut transition = None;
        {
            let mut inner = self.lock();
            if !inner.accepts(permit) {
                tracing::debug!(upstream = %self.upstream, "Ignoring stale success report");
                return;
            }
            let state = inner.state;
            match state {
                CircuitState::Closed => inner.consecutive_failures = 0,
                CircuitState::HalfOpen => {
                    transition =
                        Some(inner.move_to(CircuitState::Closed, TransitionReason::ProbeSucceeded));
                    inner.consecutive_failures = 0;
                    inner.opened_at = None;
                    inner.probe_in_flight = false;
                }
                // Late unscoped report from a call admitted before the breaker opened.
                CircuitState::Open => {}
            }
        }
        self.publish(transition);
    }

    fn settle_failure(&self, permit: Option<Permit>) {
        let mut transition = None;
        {
            let mut inner = self.lock();
            if !inner.accepts(permit) {
                tracing::debug!(upstream = %self.upstream, "Ignoring stale failure report");
                return;
            }
            let state = inner.state;
            match state {
                CircuitState::Closed => {
                    inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                    if inner.consecutive_failures >= self.failure_threshold {
                        transition = Some(inner.move_to(
                            CircuitState::Open,
                            TransitionReason::FailureThresholdReached,
                        ));
                        inner.opened_at = Some(self.clock.now());
                    }
                }
                CircuitState::HalfOpen => {
                    transition =
                        Some(inner.move_to(CircuitState::Open, TransitionReason::ProbeFailed));
                    inner.opened_at = Some(self.clock.now());
                    inner.probe_in_flight = false;
                }
                CircuitState::Open => {}
            }
        }
        self.publish(transition);
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Receive every future transition of this breaker.
    pub fn subscribe(&self) -> broadcast::Receiver<BreakerTransition> {
        self.events.subscribe()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        // Mutations are small and non-panicking, so a poisoned lock is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, transition: Option<Transition>) {
        let Some((from, to, reason)) = transition else {
            return;
        };

        if to == CircuitState::Open {
            tracing::warn!(
                upstream = %self.upstream,
                old_state = %from,
                new_state = %to,
                reason = reason.as_str(),
                open_duration_secs = self.open_duration.as_secs_f64(),
                "Circuit breaker opened"
            );
        } else {
            tracing::info!(
                upstream = %self.upstream,
                old_state = %from,
                new_state = %to,
                reason = reason.as_str(),
                "Circuit breaker state transition"
            );
        }

        metrics::record_circuit_transition(&self.upstream, from, to);

        // No subscribers is fine.
        let _ = self.events.send(BreakerTransition {
            upstream: self.upstream.clone(),
            from,
            to,
            reason,
            timestamp: SystemTime::now(),
        });
    }
}
