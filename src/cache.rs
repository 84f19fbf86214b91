//! Namespaced TTL cache for activity responses
//!
//! Entries expire after a fixed TTL; a sweep runs opportunistically on
//! access once the sweep period has elapsed. The activity response cache
//! is the only process-global consumer (TTL 5 minutes, sweep 10 minutes).
//!
//! Time goes through `tokio::time::Instant` so tests can drive expiry with
//! the paused clock.

use std::sync::LazyLock;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

/// Default time-to-live for cached activity responses.
pub const ACTIVITY_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
/// Period between expired-entry sweeps.
pub const ACTIVITY_CACHE_SWEEP: Duration = Duration::from_secs(10 * 60);

/// Namespace and key joined with a NUL byte; namespaces are action keys
/// and cache keys are hex digests, so neither contains NUL.
fn entry_key(namespace: &str, key: &str) -> String {
    format!("{}\u{0}{}", namespace, key)
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// In-memory key-value cache with per-entry TTL.
#[derive(Debug)]
pub struct TtlCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
}

impl TtlCache {
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            sweep_interval,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Fetch a live entry. Expired entries are dropped on access.
    pub fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        self.maybe_sweep();
        let composite = entry_key(namespace, key);
        let entry = self.entries.get(&composite)?;
        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.entries.remove(&composite);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Store a value under the cache's default TTL.
    pub fn set(&self, namespace: &str, key: &str, value: Value) {
        self.set_with_ttl(namespace, key, value, self.ttl);
    }

    pub fn set_with_ttl(&self, namespace: &str, key: &str, value: Value, ttl: Duration) {
        self.maybe_sweep();
        self.entries.insert(
            entry_key(namespace, key),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry once per sweep interval.
    fn maybe_sweep(&self) {
        let now = Instant::now();
        {
            let mut last = self.last_sweep.lock();
            if now.duration_since(*last) < self.sweep_interval {
                return;
            }
            *last = now;
        }
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        debug!(
            swept = before - self.entries.len(),
            remaining = self.entries.len(),
            "cache sweep"
        );
    }
}

/// Process-global cache for activity responses, keyed by
/// `(composite_action_key, md5(serialized_payload))`.
pub fn activity_cache() -> &'static TtlCache {
    static CACHE: LazyLock<TtlCache> =
        LazyLock::new(|| TtlCache::new(ACTIVITY_CACHE_TTL, ACTIVITY_CACHE_SWEEP));
    &CACHE
}
