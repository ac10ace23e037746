//! String-keyed read-through cache.
//!
//! Computed values live in an LRU map. A miss registers a pending
//! [`OnceCell`] in a separate table, so concurrent misses on the same key
//! share one computation and capacity eviction never drops a computation in
//! flight. The lock is never held while computing.

use lru::LruCache;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Read-through cache contract.
pub trait Cache<V>: Send + Sync {
    /// Insert or replace the value for `key`.
    fn add(&self, key: &str, value: V);

    /// Look up `key` without computing anything on a miss.
    fn get(&self, key: &str) -> Option<V>;

    /// Return the cached value or compute, store and return it.
    fn or_else<E, F>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>;

    /// Drop the entry for `key`, returning the value it held.
    fn evict(&self, key: &str) -> Option<V>;

    fn clear(&self);
}

struct Entry<V> {
    value: V,
    created_at: Instant,
}

struct Slots<V> {
    entries: LruCache<String, Entry<V>>,
    pending: HashMap<String, Arc<OnceCell<V>>>,
}

impl<V> Slots<V> {
    fn new(entries: LruCache<String, Entry<V>>) -> Self {
        Self {
            entries,
            pending: HashMap::new(),
        }
    }

    /// Remove the pending cell for `key` if it is still `cell`.
    fn take_pending(&mut self, key: &str, cell: &Arc<OnceCell<V>>) -> bool {
        let owned = self
            .pending
            .get(key)
            .is_some_and(|pending| Arc::ptr_eq(pending, cell));
        if owned {
            self.pending.remove(key);
        }
        owned
    }
}

/// In-memory [`Cache`] with an optional capacity bound (LRU) and TTL.
///
/// The capacity bounds computed entries; computations in flight are tracked
/// outside it.
pub struct MemoryCache<V> {
    ttl: Option<Duration>,
    inner: Mutex<Slots<V>>,
}

impl<V> MemoryCache<V>
where
    V: Clone + Send + Sync,
{
    /// Unbounded cache without expiry.
    pub fn unbounded() -> Self {
        Self {
            ttl: None,
            inner: Mutex::new(Slots::new(LruCache::unbounded())),
        }
    }

    /// Cache holding at most `capacity` entries, each for at most `ttl`.
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let size = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl: ttl.filter(|ttl| !ttl.is_zero()),
            inner: Mutex::new(Slots::new(LruCache::new(size))),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Number of keys, including ones whose computation is in flight.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.entries.len() + inner.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict every key matching `predicate`, returning how many were dropped.
    ///
    /// Matching computations in flight are detached: they still complete for
    /// their callers but are not stored.
    pub fn evict_where(&self, mut predicate: impl FnMut(&str) -> bool) -> usize {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner
            .entries
            .iter()
            .map(|(key, _)| key)
            .filter(|key| predicate(key))
            .cloned()
            .collect();
        for key in &keys {
            inner.entries.pop(key);
        }
        let before = inner.pending.len();
        inner.pending.retain(|key, _| !predicate(key));
        keys.len() + before - inner.pending.len()
    }

    /// Drain every computed value, leaving the cache empty.
    pub fn drain(&self) -> Vec<V> {
        let mut inner = self.inner.lock();
        inner.pending.clear();
        let mut values = Vec::with_capacity(inner.entries.len());
        while let Some((_, entry)) = inner.entries.pop_lru() {
            values.push(entry.value);
        }
        values
    }

    fn is_expired(&self, entry: &Entry<V>, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => entry.created_at + ttl <= now,
            None => false,
        }
    }

    /// Fresh value for `key`, dropping it if it has expired.
    fn lookup(&self, inner: &mut Slots<V>, key: &str, now: Instant) -> Option<V> {
        let expired = match inner.entries.get(key) {
            Some(entry) if self.is_expired(entry, now) => true,
            Some(entry) => return Some(entry.value.clone()),
            None => false,
        };
        if expired {
            inner.entries.pop(key);
        }
        None
    }

    fn get_with_now(&self, key: &str, now: Instant) -> Option<V> {
        let mut inner = self.inner.lock();
        self.lookup(&mut inner, key, now)
    }

    fn add_with_now(&self, key: &str, value: V, now: Instant) {
        let mut inner = self.inner.lock();
        inner.pending.remove(key);
        inner.entries.put(
            key.to_string(),
            Entry {
                value,
                created_at: now,
            },
        );
    }

    fn or_else_with_now<E, F>(&self, key: &str, compute: F, now: Instant) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let cell = {
            let mut inner = self.inner.lock();
            if let Some(value) = self.lookup(&mut inner, key, now) {
                return Ok(value);
            }
            inner
                .pending
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        match cell.get_or_try_init(compute) {
            Ok(value) => {
                let value = value.clone();
                let mut inner = self.inner.lock();
                if inner.take_pending(key, &cell) {
                    inner.entries.put(
                        key.to_string(),
                        Entry {
                            value: value.clone(),
                            created_at: now,
                        },
                    );
                }
                Ok(value)
            }
            Err(err) => {
                if cell.get().is_none() {
                    self.inner.lock().take_pending(key, &cell);
                }
                Err(err)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        self.get_with_now(key, now)
    }

    #[cfg(test)]
    pub(crate) fn or_else_at<E, F>(&self, key: &str, compute: F, now: Instant) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.or_else_with_now(key, compute, now)
    }
}

impl<V> Default for MemoryCache<V>
where
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<V> Cache<V> for MemoryCache<V>
where
    V: Clone + Send + Sync,
{
    fn add(&self, key: &str, value: V) {
        self.add_with_now(key, value, Instant::now());
    }

    fn get(&self, key: &str) -> Option<V> {
        self.get_with_now(key, Instant::now())
    }

    fn or_else<E, F>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.or_else_with_now(key, compute, Instant::now())
    }

    fn evict(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        inner.pending.remove(key);
        inner.entries.pop(key).map(|entry| entry.value)
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.pending.clear();
        inner.entries.clear();
    }
}
