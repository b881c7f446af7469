//! Per-source circuit breaker gating calls to a failing upstream.
//!
//! Each upstream source gets one process-lifetime [`CircuitBreaker`]. After
//! `failure_threshold` consecutive failures the breaker opens and
//! [`CircuitBreaker::can_execute`] returns false until `reset_timeout` has
//! elapsed since the last failure; from then on the breaker reports half-open
//! and permits trial calls. Any recorded success closes it again.
//!
//! Reads never mutate state; only `record_success`/`record_failure` do. The
//! interior is mutex-guarded so concurrent searches can share one instance.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

/// Observable breaker state. Half-open is derived, not stored: an open
/// breaker whose reset timeout has elapsed reports half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation; calls pass through.
    Closed,
    /// Rejecting calls until the reset timeout elapses.
    Open,
    /// Reset timeout elapsed; a trial call is permitted.
    HalfOpen,
}

/// Threshold and reset window for one breaker.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures required to open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays strictly open after the last failure.
    pub reset_timeout: Duration,
}

impl BreakerConfig {
    /// Config for the single-endpoint API source: trips fast, resets slowly.
    #[must_use]
    pub fn api() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(5 * 60),
        }
    }

    /// Config for the multi-mirror catalog source. Individual mirror failures
    /// are expected and handled by the health tracker, so the breaker
    /// tolerates more failures before tripping and resets sooner.
    #[must_use]
    pub fn catalog() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(3 * 60),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerInner {
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Failure-count state machine guarding one upstream source.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker; `name` appears in routing-decision logs.
    #[must_use]
    pub fn new(name: &'static str, config: BreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    /// Returns true if a call may proceed (closed or half-open). Read-only.
    #[must_use]
    pub fn can_execute(&self) -> bool {
        self.state() != BreakerState::Open
    }

    /// Current derived state. Read-only.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.state_at(Instant::now())
    }

    fn state_at(&self, now: Instant) -> BreakerState {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if inner.failure_count < self.config.failure_threshold {
            return BreakerState::Closed;
        }
        match inner.last_failure {
            Some(last) if now.duration_since(last) > self.config.reset_timeout => {
                BreakerState::HalfOpen
            }
            Some(_) => BreakerState::Open,
            // Threshold reached without a recorded failure time cannot happen
            // through the public API; report half-open so a trial can repair it.
            None => BreakerState::HalfOpen,
        }
    }

    /// Records a successful call: resets the failure count, closes the circuit.
    pub fn record_success(&self) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if inner.failure_count >= self.config.failure_threshold {
            debug!(source = self.name, "circuit closed after successful trial call");
        }
        inner.failure_count = 0;
        inner.last_failure = None;
    }

    /// Records a failed call; opens the circuit once the threshold is reached.
    pub fn record_failure(&self) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        if inner.failure_count == self.config.failure_threshold {
            debug!(
                source = self.name,
                failures = inner.failure_count,
                reset_secs = self.config.reset_timeout.as_secs(),
                "circuit opened"
            );
        }
    }

    /// Shifts the recorded last-failure time into the past (test hook).
    #[cfg(test)]
    fn backdate_last_failure(&self, by: Duration) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(last) = inner.last_failure {
            inner.last_failure = last.checked_sub(by);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_breaker(threshold: u32, reset: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            BreakerConfig {
                failure_threshold: threshold,
                reset_timeout: reset,
            },
        )
    }

    #[test]
    fn test_new_breaker_is_closed_and_executable() {
        let breaker = test_breaker(3, Duration::from_secs(60));
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_breaker_stays_closed_below_threshold() {
        let breaker = test_breaker(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_breaker_opens_at_threshold() {
        let breaker = test_breaker(3, Duration::from_secs(60));
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn test_breaker_half_open_after_reset_timeout() {
        let breaker = test_breaker(3, Duration::from_secs(60));
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(!breaker.can_execute());

        // Pretend the reset window has elapsed.
        breaker.backdate_last_failure(Duration::from_secs(61));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_reads_have_no_side_effects_during_half_open() {
        let breaker = test_breaker(3, Duration::from_secs(60));
        for _ in 0..3 {
            breaker.record_failure();
        }
        breaker.backdate_last_failure(Duration::from_secs(61));

        // Repeated reads keep permitting the trial call; only record_* mutates.
        assert!(breaker.can_execute());
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn test_success_closes_and_resets_count() {
        let breaker = test_breaker(3, Duration::from_secs(60));
        for _ in 0..3 {
            breaker.record_failure();
        }
        breaker.backdate_last_failure(Duration::from_secs(61));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);

        // Count restarted from zero: two more failures stay closed.
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_failed_trial_call_reopens() {
        let breaker = test_breaker(3, Duration::from_secs(60));
        for _ in 0..3 {
            breaker.record_failure();
        }
        breaker.backdate_last_failure(Duration::from_secs(61));
        assert!(breaker.can_execute());

        // Trial call fails: fresh failure timestamp, strictly open again.
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn test_per_source_configs() {
        let api = BreakerConfig::api();
        assert_eq!(api.failure_threshold, 3);
        assert_eq!(api.reset_timeout, Duration::from_secs(300));

        let catalog = BreakerConfig::catalog();
        assert_eq!(catalog.failure_threshold, 5);
        assert_eq!(catalog.reset_timeout, Duration::from_secs(180));
    }
}
