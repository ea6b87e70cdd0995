//! In-memory TTL cache for vault responses and embeddings.
//!
//! Entries are keyed by string. Vault responses use the composite key
//! produced by [`cache_key`] (`"GET /vault/notes/a.md"`), which makes
//! [`TtlCache::invalidate`] a plain prefix match: invalidating the key of a
//! path drops that path and every descendant.
//!
//! Expiry is lazy. [`TtlCache::get`] treats an expired entry as a miss and
//! deletes it. When the entry cap is reached, the oldest entry by insertion
//! is evicted.
//!
//! Every invalidation bumps an epoch. A reader that records
//! [`TtlCache::epoch`] before a slow fetch and stores the result with
//! [`TtlCache::put_if_epoch`] cannot resurrect data a concurrent write has
//! already invalidated.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Build the composite `(method, path)` key for a vault response.
pub fn cache_key(method: &str, path: &str) -> String {
    format!("{} {}", method, path)
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    seq: u64,
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Insertion order as `(seq, key)`. Stale pairs (key since replaced or
    /// removed) are skipped on eviction.
    order: VecDeque<(u64, String)>,
    next_seq: u64,
    /// Bumped by every invalidation, even one that removed nothing.
    epoch: u64,
    hits: u64,
    misses: u64,
}

/// Thread-safe TTL cache. Values are cloned out; use `Arc` for large values.
#[derive(Debug)]
pub struct TtlCache<V> {
    inner: Mutex<Inner<V>>,
    max_entries: usize,
}

/// Cache of raw vault response bodies.
pub type ResponseCache = TtlCache<String>;

impl<V: Clone> TtlCache<V> {
    /// Create a cache holding at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                next_seq: 0,
                epoch: 0,
                hits: 0,
                misses: 0,
            }),
            max_entries: max_entries.max(1),
        }
    }

    /// Look up a live entry.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.lock();
        let now = Instant::now();
        let live = match inner.entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        };
        if live.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        live
    }

    /// Insert or replace an entry that expires after `ttl`.
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let mut inner = self.lock();
        self.insert(&mut inner, key.into(), value, ttl);
    }

    /// Current invalidation epoch.
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Insert only if no invalidation has happened since `epoch` was read.
    /// Returns whether the value was stored.
    pub fn put_if_epoch(&self, key: impl Into<String>, value: V, ttl: Duration, epoch: u64) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return false;
        }
        self.insert(&mut inner, key.into(), value, ttl);
        true
    }

    fn insert(&self, inner: &mut Inner<V>, key: String, value: V, ttl: Duration) {
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let replaced = inner
            .entries
            .insert(
                key.clone(),
                CacheEntry {
                    value,
                    expires_at: Instant::now() + ttl,
                    seq,
                },
            )
            .is_some();
        inner.order.push_back((seq, key));

        if !replaced {
            while inner.entries.len() > self.max_entries {
                if !Self::evict_oldest(inner) {
                    break;
                }
            }
        }
        // Keep the order queue from growing without bound under churn.
        if inner.order.len() > self.max_entries * 2 {
            let Inner { entries, order, .. } = inner;
            order.retain(|(seq, key)| entries.get(key).is_some_and(|e| e.seq == *seq));
        }
    }

    /// Remove every entry whose key starts with `prefix`. Returns the count.
    pub fn invalidate(&self, prefix: &str) -> usize {
        let mut inner = self.lock();
        inner.epoch += 1;
        let before = inner.entries.len();
        inner.entries.retain(|k, _| !k.starts_with(prefix));
        before - inner.entries.len()
    }

    /// Remove a single exact key.
    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.entries.remove(key).is_some()
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.lock().hits
    }

    pub fn misses(&self) -> u64 {
        self.lock().misses
    }

    fn evict_oldest(inner: &mut Inner<V>) -> bool {
        while let Some((seq, key)) = inner.order.pop_front() {
            let current = inner.entries.get(&key).is_some_and(|e| e.seq == seq);
            if current {
                inner.entries.remove(&key);
                return true;
            }
        }
        false
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
