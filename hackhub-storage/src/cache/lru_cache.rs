//! Bounded least-recently-used cache.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ::lru::LruCache;
use hackhub_core::DataResult;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use super::traits::{CacheStats, QueryCache};
use crate::config::CacheConfig;

/// Default number of entries kept by the query cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Capacity-bounded LRU map with a global on/off switch.
///
/// `get` on a hit moves the entry to the most-recently-used position. `set`
/// at capacity evicts exactly one entry, the least recently used. While
/// disabled, `get` always misses and `set` is a no-op, but nothing is cleared.
pub struct BoundedLru<V> {
    entries: Mutex<LruCache<String, V>>,
    enabled: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// The query cache used by the SQL Unit of Work.
pub type LruQueryCache = BoundedLru<Vec<JsonValue>>;

impl<V: Clone> BoundedLru<V> {
    /// Create an enabled cache holding at most `capacity` entries.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            enabled: AtomicBool::new(true),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Create a cache from configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        let cache = Self::new(config.capacity);
        cache.enabled.store(config.enabled, Ordering::Relaxed);
        cache
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Look up `key`, promoting it on a hit.
    pub fn get(&self, key: &str) -> Option<V> {
        if !self.is_enabled() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let found = self.entries.lock().get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Insert or replace `key`, evicting the least-recently-used entry if
    /// a new key would exceed capacity.
    pub fn set(&self, key: &str, value: V) {
        if !self.is_enabled() {
            return;
        }
        let displaced = self.entries.lock().push(key.to_string(), value);
        if let Some((old_key, _)) = displaced {
            if old_key != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn set_global_flag(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entry_count: self.len() as u64,
        }
    }
}

impl Default for BoundedLru<Vec<JsonValue>> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl QueryCache for BoundedLru<Vec<JsonValue>> {
    fn get(&self, key: &str) -> Option<Vec<JsonValue>> {
        BoundedLru::get(self, key)
    }

    fn set(&self, key: &str, rows: Vec<JsonValue>) -> DataResult<()> {
        BoundedLru::set(self, key, rows);
        Ok(())
    }

    fn set_global_flag(&self, enabled: bool) {
        BoundedLru::set_global_flag(self, enabled)
    }

    fn stats(&self) -> CacheStats {
        BoundedLru::stats(self)
    }
}
