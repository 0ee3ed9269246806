use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fraction of the capacity dropped in one eviction pass (1/16th).
const EVICTION_BATCH_DIVISOR: usize = 16;

struct Entry<V> {
    value: V,
    expires_at: Instant,
    last_access: AtomicU64,
}

struct Inner<K, V> {
    map: DashMap<K, Entry<V>>,
    capacity: usize,
    ttl: Duration,
    tick: AtomicU64,
}

/// A thread-safe, size-bounded TTL cache backed by `DashMap`.
///
/// Every entry carries its own expiry instant, never later than
/// `inserted_at + ttl`. Expired entries are lazily evicted on access.
/// When an insert would exceed `capacity`, expired entries are purged first;
/// if the cache is still full the least-recently-used entries are dropped in
/// a batch of roughly `capacity / 16`, which keeps the eviction scan amortized
/// under high key cardinality.
///
/// A capacity of zero disables caching entirely: inserts are ignored and
/// every lookup misses.
#[derive(Clone)]
pub struct BoundedCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    /// Create a new cache holding at most `capacity` entries, each living at
    /// most `ttl`.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                map: DashMap::with_capacity(capacity.min(1024)),
                capacity,
                ttl,
                tick: AtomicU64::new(0),
            }),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Upper bound on the lifetime of any entry.
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Number of entries currently stored, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.inner.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.map.is_empty()
    }

    /// Get a cached value if it exists and hasn't expired.
    ///
    /// A hit marks the entry as most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(entry) = self.inner.map.get(key) {
            if Instant::now() < entry.expires_at {
                entry.last_access.store(self.next_tick(), Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            // Expired, drop the read guard before removing
            drop(entry);
            self.inner
                .map
                .remove_if(key, |_, entry| Instant::now() >= entry.expires_at);
        }
        None
    }

    /// Check for a live entry without touching its recency.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner
            .map
            .get(key)
            .is_some_and(|entry| Instant::now() < entry.expires_at)
    }

    /// Insert or update a value using the cache-wide TTL.
    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.inner.ttl);
    }

    /// Insert or update a value that expires after `ttl`, capped at the
    /// cache-wide TTL. A zero effective TTL stores nothing, and neither does
    /// a TTL too large to represent as an expiry instant.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let ttl = ttl.min(self.inner.ttl);
        if self.inner.capacity == 0 || ttl.is_zero() {
            return;
        }
        let Some(expires_at) = Instant::now().checked_add(ttl) else {
            tracing::debug!(ttl_secs = ttl.as_secs(), "Cache TTL out of range, entry not stored");
            return;
        };

        if !self.inner.map.contains_key(&key) && self.inner.map.len() >= self.inner.capacity {
            self.make_room();
        }

        let entry = Entry {
            value,
            expires_at,
            last_access: AtomicU64::new(self.next_tick()),
        };
        self.inner.map.insert(key, entry);
    }

    /// Remove a specific entry from the cache.
    pub fn remove(&self, key: &K) {
        self.inner.map.remove(key);
    }

    /// Remove all entries from the cache.
    pub fn clear(&self) {
        self.inner.map.clear();
    }

    /// Remove all expired entries.
    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.inner.map.retain(|_, entry| now < entry.expires_at);
    }

    fn next_tick(&self) -> u64 {
        self.inner.tick.fetch_add(1, Ordering::Relaxed)
    }

    fn make_room(&self) {
        self.evict_expired();
        let len = self.inner.map.len();
        if len < self.inner.capacity {
            return;
        }

        let batch = (self.inner.capacity / EVICTION_BATCH_DIVISOR)
            .max(1)
            .max(len + 1 - self.inner.capacity);
        let mut ticks: Vec<u64> = self
            .inner
            .map
            .iter()
            .map(|entry| entry.last_access.load(Ordering::Relaxed))
            .collect();
        if ticks.is_empty() {
            return;
        }
        let nth = batch.min(ticks.len()) - 1;
        let (_, cutoff, _) = ticks.select_nth_unstable(nth);
        let cutoff = *cutoff;

        self.inner
            .map
            .retain(|_, entry| entry.last_access.load(Ordering::Relaxed) > cutoff);
        tracing::debug!(
            capacity = self.inner.capacity,
            before = len,
            after = self.inner.map.len(),
            "Cache at capacity, evicted least recently used entries"
        );
    }
}
