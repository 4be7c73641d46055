//! C3 — in-flight request coalescing.
//!
//! Exactly one caller's `compute` future ever runs for a given fingerprint;
//! every other concurrent caller for the same fingerprint awaits that same
//! future instead of launching its own.

use std::future::Future;
use std::marker::PhantomData;

use dashmap::DashMap;
use futures::future::{FutureExt, Shared};

use crate::fingerprint::Fingerprint;

type SharedOutcome<T> = Shared<futures::future::BoxFuture<'static, T>>;

/// Map of fingerprint -> the future currently computing its result.
///
/// `DashMap` gives fine-grained per-shard locking so two unrelated
/// fingerprints never contend with each other, the same reasoning the
/// pack's server-shaped repos (e.g. the CAD backend's request cache) apply
/// when picking a concurrent map over a single `Mutex<HashMap<_>>`.
///
/// Generic over the settled value `T` (the executor instantiates this with
/// `Arc<Outcome>` so circuit-open and success both flow through the same
/// coalescing path without forcing every caller to clone a deep value).
pub struct Coalescer<T> {
    inflight: DashMap<Fingerprint, SharedOutcome<T>>,
    _marker: PhantomData<T>,
}

impl<T: Clone + Send + Sync + 'static> Default for Coalescer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> Coalescer<T> {
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
            _marker: PhantomData,
        }
    }

    /// Number of fingerprints currently being computed.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Run `compute` for `fp`, or, if another caller already registered a
    /// computation for the same fingerprint, await that one instead.
    ///
    /// The map entry is removed as soon as the future settles, regardless of
    /// success, so a later call with the same fingerprint starts a fresh
    /// computation rather than replaying a stale result (persistent caching
    /// is the result cache's job, not this one's).
    pub async fn dedupe<F, Fut>(&self, fp: Fingerprint, compute: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        // Fast path: join an existing in-flight computation.
        if let Some(existing) = self.inflight.get(&fp) {
            return existing.clone().await;
        }

        // We might race another task here; only one of us gets to insert.
        let shared: SharedOutcome<T> = compute().boxed().shared();

        match self.inflight.entry(fp) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => {
                // Someone beat us to it between the `get` above and here.
                occupied.get().clone().await
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(shared.clone());
                let result = shared.await;
                self.inflight.remove(&fp);
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionResult;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn result(stdout: &str) -> ExecutionResult {
        ExecutionResult {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
            duration_ms: 1,
            killed: false,
            cached: false,
            phase: None,
            error: false,
        }
    }

    #[tokio::test]
    async fn concurrent_identical_requests_spawn_exactly_once() {
        let coalescer = Arc::new(Coalescer::<ExecutionResult>::new());
        let spawn_count = Arc::new(AtomicUsize::new(0));
        let fp = crate::fingerprint::fingerprint("javascript", "es2022", b"console.log(2+2)");

        let mut handles = Vec::new();
        for _ in 0..50 {
            let coalescer = coalescer.clone();
            let spawn_count = spawn_count.clone();
            handles.push(tokio::spawn(async move {
                coalescer
                    .dedupe(fp, move || {
                        let spawn_count = spawn_count.clone();
                        async move {
                            spawn_count.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            result("4")
                        }
                    })
                    .await
            }));
        }

        let mut outputs = Vec::new();
        for h in handles {
            outputs.push(h.await.unwrap());
        }

        assert_eq!(spawn_count.load(Ordering::SeqCst), 1);
        assert!(outputs.iter().all(|r| r.stdout == "4"));
    }

    #[tokio::test]
    async fn map_entry_removed_after_settling() {
        let coalescer = Coalescer::<ExecutionResult>::new();
        let fp = crate::fingerprint::fingerprint("python", "3.11", b"print(1)");

        coalescer.dedupe(fp, || async { result("1") }).await;

        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn distinct_fingerprints_both_compute() {
        let coalescer = Coalescer::<ExecutionResult>::new();
        let spawn_count = Arc::new(AtomicUsize::new(0));
        let fp_a = crate::fingerprint::fingerprint("python", "3.11", b"a");
        let fp_b = crate::fingerprint::fingerprint("python", "3.11", b"b");

        let sc1 = spawn_count.clone();
        coalescer
            .dedupe(fp_a, move || async move {
                sc1.fetch_add(1, Ordering::SeqCst);
                result("a")
            })
            .await;

        let sc2 = spawn_count.clone();
        coalescer
            .dedupe(fp_b, move || async move {
                sc2.fetch_add(1, Ordering::SeqCst);
                result("b")
            })
            .await;

        assert_eq!(spawn_count.load(Ordering::SeqCst), 2);
    }
}
