//! Prometheus-text exposition of engine counters.
//!
//! Grounded on the teacher's `metrics_handler` in `lib.rs`: a plain `format!`
//! of `# HELP` / `# TYPE` lines rather than pulling in a metrics-registry
//! crate the teacher never used.

use std::fmt::Write as _;

use crate::executor::EngineStats;

pub fn render(stats: &EngineStats) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# HELP gateway_active_executions In-flight executions holding an admission permit");
    let _ = writeln!(out, "# TYPE gateway_active_executions gauge");
    let _ = writeln!(out, "gateway_active_executions {}", stats.active);

    let _ = writeln!(out, "# HELP gateway_max_concurrent Configured admission ceiling");
    let _ = writeln!(out, "# TYPE gateway_max_concurrent gauge");
    let _ = writeln!(out, "gateway_max_concurrent {}", stats.max_concurrent);

    let _ = writeln!(out, "# HELP gateway_load_percent Active executions as a percentage of max_concurrent");
    let _ = writeln!(out, "# TYPE gateway_load_percent gauge");
    let _ = writeln!(out, "gateway_load_percent {}", stats.load_percent);

    let _ = writeln!(out, "# HELP gateway_executions_total Dispatches completed since startup (one per coalesced group, not per caller)");
    let _ = writeln!(out, "# TYPE gateway_executions_total counter");
    let _ = writeln!(out, "gateway_executions_total {}", stats.total);

    let _ = writeln!(out, "# HELP gateway_uptime_seconds Seconds since the engine was constructed");
    let _ = writeln!(out, "# TYPE gateway_uptime_seconds counter");
    let _ = writeln!(out, "gateway_uptime_seconds {}", stats.uptime_secs);

    let _ = writeln!(out, "# HELP gateway_cache_entries Result-cache entries currently held");
    let _ = writeln!(out, "# TYPE gateway_cache_entries gauge");
    let _ = writeln!(out, "gateway_cache_entries {}", stats.cache_len);

    let _ = writeln!(out, "# HELP gateway_cache_hits_total Result-cache hits since startup");
    let _ = writeln!(out, "# TYPE gateway_cache_hits_total counter");
    let _ = writeln!(out, "gateway_cache_hits_total {}", stats.cache_hits);

    let _ = writeln!(out, "# HELP gateway_cache_misses_total Result-cache misses since startup");
    let _ = writeln!(out, "# TYPE gateway_cache_misses_total counter");
    let _ = writeln!(out, "gateway_cache_misses_total {}", stats.cache_misses);

    let _ = writeln!(out, "# HELP gateway_coalesced_in_flight Fingerprints currently being computed once for all waiters");
    let _ = writeln!(out, "# TYPE gateway_coalesced_in_flight gauge");
    let _ = writeln!(out, "gateway_coalesced_in_flight {}", stats.in_flight_coalesced);

    let _ = writeln!(out, "# HELP gateway_pool_spawned_total Processes spawned, by language");
    let _ = writeln!(out, "# TYPE gateway_pool_spawned_total counter");
    for pool in &stats.pools {
        let _ = writeln!(
            out,
            "gateway_pool_spawned_total{{language=\"{}\"}} {}",
            pool.language, pool.counters.spawned
        );
    }

    let _ = writeln!(out, "# HELP gateway_pool_timeouts_total Executions killed for exceeding the deadline or output cap, by language");
    let _ = writeln!(out, "# TYPE gateway_pool_timeouts_total counter");
    for pool in &stats.pools {
        let _ = writeln!(
            out,
            "gateway_pool_timeouts_total{{language=\"{}\"}} {}",
            pool.language, pool.counters.timeouts
        );
    }

    let _ = writeln!(out, "# HELP gateway_pool_errors_total Spawn failures fed into the circuit breaker, by language");
    let _ = writeln!(out, "# TYPE gateway_pool_errors_total counter");
    for pool in &stats.pools {
        let _ = writeln!(
            out,
            "gateway_pool_errors_total{{language=\"{}\"}} {}",
            pool.language, pool.counters.errors
        );
    }

    let _ = writeln!(out, "# HELP gateway_circuit_state Circuit state per language (0=closed, 1=half_open, 2=open)");
    let _ = writeln!(out, "# TYPE gateway_circuit_state gauge");
    for pool in &stats.pools {
        let value = match pool.circuit_state {
            "closed" => 0,
            "half_open" => 1,
            _ => 2,
        };
        let _ = writeln!(out, "gateway_circuit_state{{language=\"{}\"}} {}", pool.language, value);
    }

    out
}
