//! C2 — bounded fingerprint -> result cache with TTL expiry and LRU eviction.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::fingerprint::Fingerprint;
use crate::types::ExecutionResult;

struct Entry {
    result: ExecutionResult,
    expires_at: Instant,
}

/// Bounded `Fingerprint -> ExecutionResult` cache.
///
/// Capacity/eviction bookkeeping is delegated to the `lru` crate (the same
/// crate the pyexec example in the retrieval pack uses for its bytecode
/// cache); lookups use `peek` rather than `get` so a read never promotes an
/// entry, keeping eviction strictly insertion-order as the spec requires
/// rather than true recency-based LRU. Guarded by a single
/// `parking_lot::Mutex` rather than an async lock: every operation here is
/// a cheap map lookup/insert, never an await point.
pub struct ResultCache {
    ttl: Duration,
    inner: Mutex<LruCache<Fingerprint, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity > 0");
        Self {
            ttl,
            inner: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns a cached result whose `expires_at > now`, or `None`.
    /// Expired entries are evicted on touch (spec invariant 3).
    pub fn get(&self, fp: &Fingerprint) -> Option<ExecutionResult> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let expired = matches!(inner.peek(fp), Some(e) if e.expires_at <= now);
        if expired {
            inner.pop(fp);
        }

        match inner.peek(fp) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.result.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a result, refreshing `expires_at` if the key already exists.
    /// Evicts the oldest entry by insertion order when at capacity.
    ///
    /// Only called by the executor for `exit_code == 0` results (spec
    /// invariant 6); this module does not itself enforce that, since it has
    /// no opinion on what is "successful" — that's a caller concern.
    pub fn put(&self, fp: Fingerprint, result: ExecutionResult) {
        let mut inner = self.inner.lock();
        let expires_at = Instant::now() + self.ttl;
        inner.put(fp, Entry { result, expires_at });
    }

    /// Periodic removal of all entries whose TTL has lapsed.
    pub fn sweep(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let expired: Vec<Fingerprint> = inner
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(fp, _)| *fp)
            .collect();

        for fp in &expired {
            inner.pop(fp);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;

    fn ok_result(stdout: &str) -> ExecutionResult {
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

    #[test]
    fn put_then_get_hits() {
        let cache = ResultCache::new(10, Duration::from_secs(60));
        let fp = fingerprint("javascript", "es2022", b"1");
        cache.put(fp, ok_result("hi"));
        let got = cache.get(&fp).unwrap();
        assert_eq!(got.stdout, "hi");
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 0);
    }

    #[test]
    fn miss_on_unknown_key() {
        let cache = ResultCache::new(10, Duration::from_secs(60));
        let fp = fingerprint("javascript", "es2022", b"1");
        assert!(cache.get(&fp).is_none());
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn expired_entry_is_absent_and_removed() {
        let cache = ResultCache::new(10, Duration::from_millis(1));
        let fp = fingerprint("python", "3.11", b"1");
        cache.put(fp, ok_result("hi"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get(&fp).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn eviction_drops_oldest_insertion_when_full() {
        let cache = ResultCache::new(2, Duration::from_secs(60));
        let a = fingerprint("javascript", "1", b"a");
        let b = fingerprint("javascript", "1", b"b");
        let c = fingerprint("javascript", "1", b"c");

        cache.put(a, ok_result("a"));
        cache.put(b, ok_result("b"));
        cache.put(c, ok_result("c")); // evicts `a`, since gets use `peek`

        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_some());
        assert!(cache.get(&c).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reinserting_same_key_refreshes_ttl_without_growing() {
        let cache = ResultCache::new(10, Duration::from_secs(60));
        let fp = fingerprint("php", "8.3", b"1");
        cache.put(fp, ok_result("first"));
        cache.put(fp, ok_result("second"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&fp).unwrap().stdout, "second");
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let cache = ResultCache::new(10, Duration::from_millis(1));
        let fp = fingerprint("java", "17", b"1");
        cache.put(fp, ok_result("hi"));
        std::thread::sleep(Duration::from_millis(20));
        let removed = cache.sweep();
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 0);
    }
}
