//! C4 — per-language circuit breaker.
//!
//! Generalizes the teacher's single global `CircuitBreaker`
//! (closed/open only, guarding calls to one upstream API) into the full
//! closed/open/half-open state machine the spec requires, with a
//! half-open probe budget instead of "first success closes it".

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Result of asking the breaker whether a call may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Proceed with the call.
    Allowed,
    /// Circuit open, cooldown has not elapsed — fail fast.
    Rejected { retry_after: Duration },
    /// Circuit half-open, probe budget for this window exhausted.
    ProbeBudgetExhausted,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    successes_in_half_open: u32,
    last_failure_at: Option<Instant>,
    half_open_in_flight: u32,
}

/// One circuit breaker instance. The engine holds one per language.
pub struct CircuitBreaker {
    threshold: u32,
    reset_timeout: Duration,
    probe_count: u32,
    inner: RwLock<Inner>,
    // Exposed for Stats; mirrors inner.state without needing a lock.
    trip_count: AtomicU32,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_timeout: Duration, probe_count: u32) -> Self {
        Self {
            threshold,
            reset_timeout,
            probe_count,
            inner: RwLock::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                successes_in_half_open: 0,
                last_failure_at: None,
                half_open_in_flight: 0,
            }),
            trip_count: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    pub fn trip_count(&self) -> u32 {
        self.trip_count.load(Ordering::Relaxed)
    }

    /// Ask whether a call may proceed right now. Transitions Open ->
    /// HalfOpen when the cooldown has elapsed, per the state table.
    pub fn try_acquire(&self) -> Admission {
        let mut inner = self.inner.write();

        match inner.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);

                if elapsed < self.reset_timeout {
                    Admission::Rejected {
                        retry_after: self.reset_timeout - elapsed,
                    }
                } else {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_in_flight = 0;
                    inner.successes_in_half_open = 0;
                    tracing::info!("circuit: cooldown elapsed, entering half-open");
                    inner.half_open_in_flight += 1;
                    Admission::Allowed
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight >= self.probe_count {
                    Admission::ProbeBudgetExhausted
                } else {
                    inner.half_open_in_flight += 1;
                    Admission::Allowed
                }
            }
        }
    }

    /// Record that an admitted call succeeded.
    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.successes_in_half_open += 1;
                if inner.successes_in_half_open >= self.probe_count {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.successes_in_half_open = 0;
                    inner.half_open_in_flight = 0;
                    tracing::info!("circuit: closed after successful half-open probes");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record that an admitted call failed (spawn-failed only, per spec §7).
    pub fn record_failure(&self) {
        let mut inner = self.inner.write();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.threshold {
                    inner.state = CircuitState::Open;
                    inner.last_failure_at = Some(Instant::now());
                    self.trip_count.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "circuit: tripped open"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.last_failure_at = Some(Instant::now());
                inner.consecutive_failures = self.threshold;
                self.trip_count.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("circuit: half-open probe failed, reopening");
            }
            CircuitState::Open => {
                inner.last_failure_at = Some(Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(5, Duration::from_millis(30), 3)
    }

    #[test]
    fn starts_closed_and_allows_calls() {
        let b = breaker();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.try_acquire(), Admission::Allowed);
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let b = breaker();
        for _ in 0..4 {
            assert_eq!(b.try_acquire(), Admission::Allowed);
            b.record_failure();
        }
        assert_eq!(b.state(), CircuitState::Closed);

        assert_eq!(b.try_acquire(), Admission::Allowed);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[test]
    fn open_rejects_calls_before_cooldown() {
        let b = breaker();
        for _ in 0..5 {
            b.try_acquire();
            b.record_failure();
        }
        assert_eq!(b.state(), CircuitState::Open);
        assert!(matches!(b.try_acquire(), Admission::Rejected { .. }));
    }

    #[test]
    fn success_in_closed_state_resets_failure_count() {
        let b = breaker();
        for _ in 0..4 {
            b.try_acquire();
            b.record_failure();
        }
        b.try_acquire();
        b.record_success();

        // Another 4 failures should not open it now (counter was reset).
        for _ in 0..4 {
            b.try_acquire();
            b.record_failure();
        }
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_after_cooldown_then_closes_after_probe_count_successes() {
        let b = breaker();
        for _ in 0..5 {
            b.try_acquire();
            b.record_failure();
        }
        assert_eq!(b.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(b.try_acquire(), Admission::Allowed);
        assert_eq!(b.state(), CircuitState::HalfOpen);
        b.record_success();
        assert_eq!(b.try_acquire(), Admission::Allowed);
        b.record_success();
        assert_eq!(b.try_acquire(), Admission::Allowed);
        b.record_success();

        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_budget_exhausted_rejects_extra_calls() {
        let b = breaker();
        for _ in 0..5 {
            b.try_acquire();
            b.record_failure();
        }
        std::thread::sleep(Duration::from_millis(40));

        for _ in 0..3 {
            assert_eq!(b.try_acquire(), Admission::Allowed);
        }
        assert_eq!(b.try_acquire(), Admission::ProbeBudgetExhausted);
    }

    #[test]
    fn half_open_failure_reopens_circuit() {
        let b = breaker();
        for _ in 0..5 {
            b.try_acquire();
            b.record_failure();
        }
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(b.try_acquire(), Admission::Allowed);
        assert_eq!(b.state(), CircuitState::HalfOpen);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
    }
}
