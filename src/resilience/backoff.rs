//! Exponential backoff with optional jitter.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Maps a 1-based retry index to the delay before that retry.
#[derive(Clone)]
pub struct Backoff {
    delay_fn: Arc<dyn Fn(u32) -> Duration + Send + Sync>,
}

impl Backoff {
    /// `unit * base^attempt`, capped at `max`.
    pub fn exponential(base: f64, unit: Duration, max: Duration) -> Self {
        Self::from_fn(move |attempt| exponential_delay(attempt, base, unit, max))
    }

    /// Same delay before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self::from_fn(move |_| delay)
    }

    /// Arbitrary schedule.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self {
            delay_fn: Arc::new(f),
        }
    }

    /// Schedule described by an upstream's retry settings.
    pub fn from_config(config: &RetryConfig) -> Self {
        let base = config.backoff_base;
        let unit = Duration::from_millis(config.backoff_unit_ms);
        let max = Duration::from_millis(config.max_delay_ms);
        let jitter = config.jitter;
        Self::from_fn(move |attempt| {
            with_jitter(exponential_delay(attempt, base, unit, max), jitter)
        })
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        (self.delay_fn)(attempt)
    }
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoff").finish_non_exhaustive()
    }
}

/// Calculate `unit * base^attempt`, saturating at `max`.
pub fn exponential_delay(attempt: u32, base: f64, unit: Duration, max: Duration) -> Duration {
    let factor = base.powi(attempt.min(i32::MAX as u32) as i32);
    let secs = unit.as_secs_f64() * factor;
    if !secs.is_finite() || secs >= max.as_secs_f64() {
        return max;
    }
    Duration::from_secs_f64(secs.max(0.0))
}

/// Add up to `ratio` of extra random delay.
pub fn with_jitter(delay: Duration, ratio: f64) -> Duration {
    let ratio = ratio.clamp(0.0, 1.0);
    let jitter_range = (delay.as_millis() as f64 * ratio) as u64;
    if jitter_range == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_range))
}
