//! Env-driven engine configuration, built once at startup.
//!
//! Mirrors the teacher's inline `std::env::var(...).unwrap_or_else(...)`
//! style (see `AppState::new` / `ToolExecutor::new` in the original
//! backend) rather than reaching for a config-file crate the teacher never
//! used.

use std::time::Duration;

/// Hard ceiling on result-cache capacity regardless of what the environment
/// requests — keeps a misconfigured deployment from growing the cache
/// unbounded.
const CACHE_CAPACITY_CEILING: usize = 100_000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum source size accepted, in bytes.
    pub max_source_bytes: usize,
    /// Global concurrency ceiling enforced at admission.
    pub max_concurrent: usize,
    /// Per-execution wall-clock deadline.
    pub run_timeout: Duration,
    /// Cap on captured stdout/stderr per stream, in bytes.
    pub max_output_bytes: usize,
    /// Result-cache capacity (entries).
    pub cache_capacity: usize,
    /// Result-cache TTL.
    pub cache_ttl: Duration,
    /// Consecutive spawn failures before a language's circuit opens.
    pub circuit_threshold: u32,
    /// Cooldown before an open circuit allows a half-open probe.
    pub circuit_reset: Duration,
    /// Consecutive half-open successes required to close the circuit.
    pub circuit_probe_count: u32,
    /// How often the cache sweep and scratch sweep run.
    pub sweep_interval: Duration,
    /// How often the stats logger runs — shorter than `sweep_interval` so
    /// operators get a liveness signal between sweep passes (spec §3
    /// lifecycle: sweeps ≈ 60s, stats logger ≈ 5s).
    pub stats_log_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_source_bytes: 100_000,
            max_concurrent: 64,
            run_timeout: Duration::from_millis(10_000),
            max_output_bytes: 100_000,
            cache_capacity: 10_000,
            cache_ttl: Duration::from_secs(30 * 60),
            circuit_threshold: 5,
            circuit_reset: Duration::from_secs(30),
            circuit_probe_count: 3,
            sweep_interval: Duration::from_secs(60),
            stats_log_interval: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Build configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_concurrent = env_usize("GATEWAY_MAX_CONCURRENT", defaults.max_concurrent);
        let run_timeout_ms = env_u64("RUN_TIMEOUT_MS", defaults.run_timeout.as_millis() as u64);
        let max_output_bytes = env_usize("GATEWAY_MAX_OUTPUT_BYTES", defaults.max_output_bytes);
        let cache_capacity =
            env_usize("GATEWAY_CACHE_CAPACITY", defaults.cache_capacity).min(CACHE_CAPACITY_CEILING);
        let cache_ttl_secs = env_u64("GATEWAY_CACHE_TTL_SECS", defaults.cache_ttl.as_secs());
        let circuit_threshold = env_u32("GATEWAY_CIRCUIT_THRESHOLD", defaults.circuit_threshold);
        let circuit_reset_secs = env_u64("GATEWAY_CIRCUIT_RESET_SECS", defaults.circuit_reset.as_secs());
        let circuit_probe_count = env_u32("GATEWAY_CIRCUIT_PROBE_COUNT", defaults.circuit_probe_count);

        Self {
            max_source_bytes: defaults.max_source_bytes,
            max_concurrent,
            run_timeout: Duration::from_millis(run_timeout_ms),
            max_output_bytes,
            cache_capacity,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            circuit_threshold,
            circuit_reset: Duration::from_secs(circuit_reset_secs),
            circuit_probe_count,
            sweep_interval: defaults.sweep_interval,
            stats_log_interval: defaults.stats_log_interval,
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
