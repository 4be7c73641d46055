//! C8 — the engine: composes fingerprinting, caching, coalescing, circuit
//! breaking, and process execution behind one `execute` call, and owns the
//! background sweep/stats tasks for its lifetime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;

use crate::cache::ResultCache;
use crate::circuit::CircuitState;
use crate::coalesce::Coalescer;
use crate::config::Config;
use crate::error::EngineError;
use crate::fingerprint;
use crate::policy::{ExecutionPolicy, PolicyDecision};
use crate::pool::{DispatchError, LanguagePool, PoolCountersSnapshot};
use crate::scratch::ScratchDir;
use crate::types::{ExecuteRequest, ExecutionResult, Language};

/// Snapshot of one language pool's circuit and counters, for `Engine::stats`.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub language: &'static str,
    pub circuit_state: &'static str,
    pub circuit_trip_count: u32,
    pub counters: PoolCountersSnapshot,
}

/// Whole-engine snapshot, surfaced at `GET /api/stats` and rendered as
/// Prometheus text by [`crate::metrics`].
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub active: usize,
    pub total: u64,
    pub max_concurrent: usize,
    /// `active / max_concurrent`, as a percentage. Drives `/health`'s
    /// derived `status` (healthy below 90%, spec §6.1).
    pub load_percent: f64,
    pub uptime_secs: u64,
    pub cache_len: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub in_flight_coalesced: usize,
    pub pools: Vec<PoolStats>,
}

/// Result of one coalesced computation — either a completed execution or a
/// circuit-open rejection observed by the one caller that actually ran the
/// dispatch. Kept distinct from [`ExecutionResult`] so a circuit-open
/// outcome surfaces to every coalesced caller as the `EngineError` the spec
/// requires (503, not a 200 with an `error` body).
enum Outcome {
    Completed(ExecutionResult),
    CircuitOpen { retry_after: Duration },
    CapacityExceeded { active: usize, max_concurrent: usize },
}

fn circuit_state_label(state: CircuitState) -> &'static str {
    match state {
        CircuitState::Closed => "closed",
        CircuitState::Open => "open",
        CircuitState::HalfOpen => "half_open",
    }
}

/// The top-level engine. Cheap to clone — internals are `Arc`-shared, the
/// same ownership shape the teacher's `AppState` uses for its shared
/// backend handles.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    cache: ResultCache,
    coalescer: Coalescer<Arc<Outcome>>,
    pools: HashMap<Language, LanguagePool>,
    scratch: ScratchDir,
    policy: Box<dyn ExecutionPolicy>,
    admission: Semaphore,
    active: AtomicUsize,
    total: AtomicU64,
    start_time: Instant,
}

impl Engine {
    /// Build a new engine with the default allow-all policy.
    pub fn new(config: Config) -> std::io::Result<Self> {
        Self::with_policy(config, Box::new(crate::policy::AllowAll))
    }

    pub fn with_policy(config: Config, policy: Box<dyn ExecutionPolicy>) -> std::io::Result<Self> {
        let scratch = ScratchDir::create()?;
        let pools = Language::pooled_variants()
            .into_iter()
            .map(|language| (language, LanguagePool::new(language, &config)))
            .collect();

        let admission = Semaphore::new(config.max_concurrent);
        let cache = ResultCache::new(config.cache_capacity, config.cache_ttl);

        Ok(Self {
            inner: Arc::new(Inner {
                cache,
                coalescer: Coalescer::new(),
                pools,
                scratch,
                policy,
                admission,
                active: AtomicUsize::new(0),
                total: AtomicU64::new(0),
                start_time: Instant::now(),
                config,
            }),
        })
    }

    /// Run one execution end to end: policy check, size check, admission,
    /// fingerprint, cache lookup, coalesced dispatch, cache fill.
    pub async fn execute(&self, request: ExecuteRequest) -> Result<ExecutionResult, EngineError> {
        if let PolicyDecision::Deny(reason) = self.inner.policy.check(&request) {
            return Err(EngineError::PolicyRejected(reason));
        }

        if request.source.len() > self.inner.config.max_source_bytes {
            return Err(EngineError::InputTooLarge {
                max: self.inner.config.max_source_bytes,
                actual: request.source.len(),
            });
        }

        let dispatch_language = request.language.dispatch_target();
        if !self.inner.pools.contains_key(&dispatch_language) {
            return Err(EngineError::Unsupported(request.language.to_string()));
        }

        let fp = fingerprint::fingerprint(request.language.as_str(), &request.version, &request.source);

        if let Some(cached) = self.inner.cache.get(&fp) {
            return Ok(cached.with_cached(true));
        }

        let deadline = self.inner.config.run_timeout;
        let max_output_bytes = self.inner.config.max_output_bytes;
        let source = request.source;
        let inner = self.inner.clone();

        let outcome: Arc<Outcome> = self
            .inner
            .coalescer
            .dedupe(fp, move || async move {
                // Re-resolved inside the future rather than captured as a
                // reference, since this future can outlive the `Engine`
                // handle that started it — a later caller may join it via
                // `Coalescer::dedupe` after this call's `Engine` clone is
                // dropped.
                //
                // Admission is enforced here, by the one caller whose
                // closure actually runs, with `try_acquire` rather than a
                // blocking `acquire` — spec §4.8 point 1 requires overload
                // to fail fast with `capacity`, and the engine "does not
                // queue internally beyond the coalescer" (spec §1). A
                // snapshot-then-acquire sequence would let a burst of
                // distinct fingerprints all pass the snapshot check and
                // then pile up waiting on the semaphore instead of
                // rejecting; `try_acquire` makes the check and the
                // reservation one atomic step.
                let permit = match inner.admission.try_acquire() {
                    Ok(permit) => permit,
                    Err(_) => {
                        return Arc::new(Outcome::CapacityExceeded {
                            active: inner.active.load(Ordering::Relaxed),
                            max_concurrent: inner.config.max_concurrent,
                        });
                    }
                };
                inner.active.fetch_add(1, Ordering::Relaxed);
                inner.total.fetch_add(1, Ordering::Relaxed);

                let pool = inner.pools.get(&dispatch_language).expect("checked above");
                let dispatched = pool.dispatch(&inner.scratch, &source, deadline, max_output_bytes).await;

                inner.active.fetch_sub(1, Ordering::Relaxed);
                drop(permit);

                Arc::new(match dispatched {
                    Ok(result) => Outcome::Completed(result),
                    Err(DispatchError::CircuitOpen { retry_after }) => Outcome::CircuitOpen { retry_after },
                })
            })
            .await;

        match &*outcome {
            Outcome::Completed(result) => {
                if result.cacheable() {
                    self.inner.cache.put(fp, result.clone());
                }
                Ok(result.clone())
            }
            Outcome::CircuitOpen { retry_after } => Err(EngineError::CircuitOpen {
                language: dispatch_language.to_string(),
                retry_after_secs: retry_after.as_secs(),
            }),
            Outcome::CapacityExceeded { active, max_concurrent } => Err(EngineError::Capacity {
                active: *active,
                max_concurrent: *max_concurrent,
            }),
        }
    }

    /// Snapshot counters and circuit states for every language pool plus
    /// cache/coalescer/admission state.
    pub fn stats(&self) -> EngineStats {
        let pools = Language::pooled_variants()
            .into_iter()
            .filter_map(|language| self.inner.pools.get(&language).map(|pool| (language, pool)))
            .map(|(language, pool)| PoolStats {
                language: language.as_str(),
                circuit_state: circuit_state_label(pool.circuit().state()),
                circuit_trip_count: pool.circuit().trip_count(),
                counters: pool.counters().snapshot(),
            })
            .collect();

        let active = self.inner.active.load(Ordering::Relaxed);
        let max_concurrent = self.inner.config.max_concurrent;

        EngineStats {
            active,
            total: self.inner.total.load(Ordering::Relaxed),
            max_concurrent,
            load_percent: if max_concurrent == 0 {
                0.0
            } else {
                (active as f64 / max_concurrent as f64) * 100.0
            },
            uptime_secs: self.inner.start_time.elapsed().as_secs(),
            cache_len: self.inner.cache.len(),
            cache_hits: self.inner.cache.hits(),
            cache_misses: self.inner.cache.misses(),
            in_flight_coalesced: self.inner.coalescer.in_flight(),
            pools,
        }
    }

    /// Best-effort warm-up: run one benign snippet per language so the
    /// first real request doesn't pay a cold-interpreter-start penalty.
    /// Failures are logged, never fatal — a missing interpreter in this
    /// environment just means that language stays slow on first use.
    pub async fn warm_up(&self) {
        let snippets: [(Language, &[u8]); 4] = [
            (Language::Javascript, b"1"),
            (Language::Python, b"1"),
            (Language::Php, b"<?php echo 1;"),
            (Language::Java, b"public class Main { public static void main(String[] a) {} }"),
        ];

        for (language, source) in snippets {
            let request = ExecuteRequest {
                language,
                version: "latest".to_string(),
                source: source.to_vec(),
            };
            match self.execute(request).await {
                Ok(result) if !result.error => {
                    tracing::info!(%language, "engine: warm-up succeeded");
                }
                Ok(result) => {
                    tracing::warn!(%language, stderr = %result.stderr, "engine: warm-up run failed");
                }
                Err(e) => {
                    tracing::warn!(%language, error = %e, "engine: warm-up rejected");
                }
            }
        }
    }

    /// Spawn the periodic cache sweep, scratch sweep, and stats logger as
    /// two independent background loops (spec §3 lifecycle: sweeps ≈ 60s,
    /// stats logger ≈ 5s — different cadences, so one shared sleep can't
    /// serve both). Mirrors the teacher's `watchdog::spawn` shape: a
    /// `tokio::spawn` wrapping `loop { sleep; ... }`, run for the life of
    /// the process.
    pub fn spawn_background_tasks(&self) -> Vec<tokio::task::JoinHandle<()>> {
        vec![self.spawn_sweep_task(), self.spawn_stats_log_task()]
    }

    fn spawn_sweep_task(&self) -> tokio::task::JoinHandle<()> {
        let engine = self.clone();
        let interval = self.inner.config.sweep_interval;

        tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "engine: sweep task started");
            loop {
                tokio::time::sleep(interval).await;

                let expired = engine.inner.cache.sweep();
                let orphaned = engine.inner.scratch.sweep();

                tracing::info!(
                    expired_cache_entries = expired,
                    orphaned_scratch_entries = orphaned,
                    "engine: sweep complete"
                );
            }
        })
    }

    fn spawn_stats_log_task(&self) -> tokio::task::JoinHandle<()> {
        let engine = self.clone();
        let interval = self.inner.config.stats_log_interval;

        tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "engine: stats logger started");
            loop {
                tokio::time::sleep(interval).await;

                let stats = engine.stats();
                tracing::info!(
                    active = stats.active,
                    total = stats.total,
                    load_percent = stats.load_percent,
                    cache_len = stats.cache_len,
                    in_flight_coalesced = stats.in_flight_coalesced,
                    "engine: stats"
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            max_source_bytes: 1000,
            max_concurrent: 4,
            run_timeout: Duration::from_secs(5),
            max_output_bytes: 1000,
            cache_capacity: 10,
            cache_ttl: Duration::from_secs(60),
            circuit_threshold: 5,
            circuit_reset: Duration::from_secs(30),
            circuit_probe_count: 3,
            sweep_interval: Duration::from_secs(60),
            stats_log_interval: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn execute_rejects_oversized_source() {
        let engine = Engine::new(test_config()).unwrap();
        let request = ExecuteRequest {
            language: Language::Python,
            version: "3".to_string(),
            source: vec![b'a'; 2000],
        };
        let err = engine.execute(request).await.unwrap_err();
        assert!(matches!(err, EngineError::InputTooLarge { .. }));
    }

    #[tokio::test]
    async fn execute_rejects_via_policy() {
        let engine = Engine::with_policy(
            test_config(),
            Box::new(crate::policy::DenyLanguage(Language::Php)),
        )
        .unwrap();
        let request = ExecuteRequest {
            language: Language::Php,
            version: "8".to_string(),
            source: b"<?php echo 1;".to_vec(),
        };
        let err = engine.execute(request).await.unwrap_err();
        assert!(matches!(err, EngineError::PolicyRejected(_)));
    }

    #[tokio::test]
    async fn second_identical_execution_is_served_from_cache() {
        let engine = Engine::new(test_config()).unwrap();
        let request = || ExecuteRequest {
            language: Language::Python,
            version: "3".to_string(),
            source: b"print(1)".to_vec(),
        };

        let first = engine.execute(request()).await.unwrap();
        if first.error {
            // python3 not available in this environment; nothing further to assert.
            return;
        }
        assert!(!first.cached);

        let second = engine.execute(request()).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.stdout, first.stdout);
    }

    #[tokio::test]
    async fn concurrent_distinct_requests_beyond_capacity_fail_fast() {
        let mut config = test_config();
        config.max_concurrent = 1;
        let engine = Engine::new(config).unwrap();

        // Distinct fingerprints (different source) so neither request joins
        // the other via the coalescer -- each must independently contend for
        // the single admission permit.
        let slow = ExecuteRequest {
            language: Language::Python,
            version: "3".to_string(),
            source: b"import time; time.sleep(1)".to_vec(),
        };
        let fast = ExecuteRequest {
            language: Language::Python,
            version: "3".to_string(),
            source: b"print(2)".to_vec(),
        };

        let engine_a = engine.clone();
        let holder = tokio::spawn(async move { engine_a.execute(slow).await });
        // Give the first request a head start so it has already acquired the
        // sole permit by the time the second one is dispatched.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let second = engine.execute(fast).await;
        let first = holder.await.unwrap();

        if let Ok(first) = &first {
            if first.error {
                // python3 not available in this environment; nothing further to assert.
                return;
            }
        }

        match second {
            Err(EngineError::Capacity { active, max_concurrent }) => {
                assert_eq!(max_concurrent, 1);
                assert!(active >= 1);
            }
            other => panic!("expected EngineError::Capacity, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stats_reports_one_entry_per_pooled_language() {
        let engine = Engine::new(test_config()).unwrap();
        let stats = engine.stats();
        assert_eq!(stats.pools.len(), 4);
        assert_eq!(stats.max_concurrent, 4);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.load_percent, 0.0);
    }

    #[tokio::test]
    async fn total_counter_increments_once_per_dispatch_not_per_caller() {
        let engine = Engine::new(test_config()).unwrap();
        let request = ExecuteRequest {
            language: Language::Python,
            version: "3".to_string(),
            source: b"print(1)".to_vec(),
        };

        // Ten concurrent identical requests collapse into one dispatch via
        // the coalescer, so `total` should advance by at most one.
        let mut handles = Vec::new();
        for _ in 0..10 {
            let engine = engine.clone();
            let request = request.clone();
            handles.push(tokio::spawn(async move { engine.execute(request).await }));
        }
        for h in handles {
            let _ = h.await.unwrap();
        }

        assert!(engine.stats().total <= 1);
        // `active` always returns to zero once every dispatch has settled.
        assert_eq!(engine.stats().active, 0);
    }
}
