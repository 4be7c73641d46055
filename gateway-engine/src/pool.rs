//! Per-language pool facade — couples the circuit breaker (C4) with the
//! process runner/dispatch (C5/C6), and tracks per-language counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::circuit::{Admission, CircuitBreaker};
use crate::config::Config;
use crate::language;
use crate::scratch::ScratchDir;
use crate::types::{ExecutionResult, Language};

/// Per-language counters. `reused` stays at zero in this engine — every
/// execution spawns a fresh interpreter process (spec §4.5); it is kept as
/// a field so `Stats` carries the full shape the spec's data model
/// describes, ready for a future pooled-process implementation.
#[derive(Debug, Default)]
pub struct PoolCounters {
    pub spawned: AtomicU64,
    pub reused: AtomicU64,
    pub timeouts: AtomicU64,
    pub errors: AtomicU64,
    pub in_flight: AtomicU64,
}

impl PoolCounters {
    pub fn snapshot(&self) -> PoolCountersSnapshot {
        PoolCountersSnapshot {
            spawned: self.spawned.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct PoolCountersSnapshot {
    pub spawned: u64,
    pub reused: u64,
    pub timeouts: u64,
    pub errors: u64,
    pub in_flight: u64,
}

/// Error surfaced when a pool refuses to dispatch at all.
#[derive(Debug)]
pub enum DispatchError {
    CircuitOpen { retry_after: Duration },
}

/// Couples one language's circuit breaker, counters, and dispatch logic.
/// Fails fast when its circuit is open, without launching a process.
pub struct LanguagePool {
    language: Language,
    circuit: CircuitBreaker,
    counters: PoolCounters,
}

impl LanguagePool {
    pub fn new(language: Language, config: &Config) -> Self {
        Self {
            language,
            circuit: CircuitBreaker::new(
                config.circuit_threshold,
                config.circuit_reset,
                config.circuit_probe_count,
            ),
            counters: PoolCounters::default(),
        }
    }

    pub fn circuit(&self) -> &CircuitBreaker {
        &self.circuit
    }

    pub fn counters(&self) -> &PoolCounters {
        &self.counters
    }

    /// Dispatch one execution through this pool: consult the circuit,
    /// prepare the language handler, run the process plan, and feed the
    /// result back into the circuit. Only spawn-failed results trip the
    /// circuit (spec §7) — timeouts and non-zero user exits do not.
    pub async fn dispatch(
        &self,
        scratch: &ScratchDir,
        source: &[u8],
        deadline: Duration,
        max_output_bytes: usize,
    ) -> Result<ExecutionResult, DispatchError> {
        match self.circuit.try_acquire() {
            Admission::Allowed => {}
            Admission::Rejected { retry_after } => {
                return Err(DispatchError::CircuitOpen { retry_after });
            }
            Admission::ProbeBudgetExhausted => {
                return Err(DispatchError::CircuitOpen {
                    retry_after: Duration::from_secs(1),
                });
            }
        }

        self.counters.in_flight.fetch_add(1, Ordering::Relaxed);

        let handler = language::handler_for(self.language);
        let prepared = handler.prepare(scratch, source);

        let result = match prepared {
            Ok((plan, files)) => {
                self.counters.spawned.fetch_add(1, Ordering::Relaxed);
                language::execute_plan(plan, files, scratch, deadline, max_output_bytes).await
            }
            Err(e) => ExecutionResult {
                stdout: String::new(),
                stderr: format!("failed to prepare source: {e}"),
                exit_code: -1,
                duration_ms: 0,
                killed: false,
                cached: false,
                phase: None,
                error: true,
            },
        };

        self.counters.in_flight.fetch_sub(1, Ordering::Relaxed);

        // Only spawn-failed results feed the circuit; timeouts and
        // non-zero user exits are user-caused and record a success instead
        // (spec §7 — this is the more restrictive contract the spec
        // mandates over the original's acquisition-only behavior).
        if result.error {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            self.circuit.record_failure();
        } else {
            if result.killed {
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            self.circuit.record_success();
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            circuit_threshold: 2,
            circuit_reset: Duration::from_millis(50),
            circuit_probe_count: 1,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn spawn_failure_feeds_circuit_and_opens_after_threshold() {
        let pool = LanguagePool::new(Language::Python, &config());
        let scratch_dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::at(scratch_dir.path().join("scratch")).unwrap();

        // PythonHandler always succeeds at `prepare` (no file I/O); force a
        // spawn failure by pointing at a nonexistent interpreter is not
        // possible without changing the handler, so this test drives the
        // circuit directly to verify the open/reject contract pool-side.
        for _ in 0..2 {
            pool.circuit().try_acquire();
            pool.circuit().record_failure();
        }
        assert!(matches!(
            pool.dispatch(&scratch, b"print(1)", Duration::from_secs(5), 1000).await,
            Err(DispatchError::CircuitOpen { .. })
        ));
    }

    #[tokio::test]
    async fn successful_dispatch_does_not_trip_circuit() {
        let pool = LanguagePool::new(Language::Python, &config());
        let scratch_dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::at(scratch_dir.path().join("scratch")).unwrap();

        let result = pool
            .dispatch(&scratch, b"print(1)", Duration::from_secs(5), 1000)
            .await
            .unwrap();

        // Environment may or may not have python3 installed; either way the
        // circuit must reflect "not a spawn failure feeding it" unless the
        // interpreter itself is genuinely missing.
        if !result.error {
            assert_eq!(pool.circuit().state(), crate::circuit::CircuitState::Closed);
        }
    }
}
