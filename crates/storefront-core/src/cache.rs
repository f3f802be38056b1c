//! Bounded TTL cache with LRU eviction.
//!
//! Shared between cooperatively-scheduled tasks; the interior mutex is held
//! only for map bookkeeping, never across await points. Racing misses that
//! recompute and `set` the same key are benign; the later write wins.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    seq: u64,
}

struct CacheInner<V> {
    map: HashMap<String, CacheEntry<V>>,
    // Lazily-invalidated recency queue: stale (seq, key) pairs are skipped
    // during eviction when the entry's current seq no longer matches.
    recency: VecDeque<(u64, String)>,
    next_seq: u64,
}

pub struct TtlCache<V> {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache holding at most `capacity` entries, each valid for
    /// `ttl` after the most recent `set`. Capacity floors at 1 entry and
    /// TTL at 1 second.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl: ttl.max(Duration::from_secs(1)),
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                recency: VecDeque::new(),
                next_seq: 0,
            }),
        }
    }

    /// Fetch an unexpired entry, promoting it to most-recently-used.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Insert or refresh an entry, evicting least-recently-used entries
    /// beyond capacity.
    pub fn set(&self, key: &str, value: V) {
        self.set_at(key, value, Instant::now());
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clock-injected variant of [`TtlCache::get`].
    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        let expired = match inner.map.get(key) {
            None => return None,
            Some(entry) => entry.expires_at <= now,
        };
        if expired {
            inner.map.remove(key);
            return None;
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let entry = inner.map.get_mut(key).expect("entry just checked");
        entry.seq = seq;
        let value = entry.value.clone();
        inner.recency.push_back((seq, key.to_string()));
        Some(value)
    }

    /// Clock-injected variant of [`TtlCache::set`].
    pub fn set_at(&self, key: &str, value: V, now: Instant) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.map.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + self.ttl,
                seq,
            },
        );
        inner.recency.push_back((seq, key.to_string()));

        while inner.map.len() > self.capacity {
            let Some((stale_seq, stale_key)) = inner.recency.pop_front() else {
                break;
            };
            if inner
                .map
                .get(&stale_key)
                .is_some_and(|entry| entry.seq == stale_seq)
            {
                inner.map.remove(&stale_key);
            }
        }
    }
}
