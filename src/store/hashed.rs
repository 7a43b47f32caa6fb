//! Hash-map store with O(1) amortized lookup, insert and delete.
//!
//! `HashedStore` owns its keys and values and knows nothing about capacity
//! or recency; [`BoundedCache`](crate::bounded::BoundedCache) layers both on
//! top and provides the locking. Keys can be looked up through any borrowed
//! form, so a `Bytes`-keyed store answers `&[u8]` queries without copying.
//!
//! ## Example Usage
//! ```rust
//! use sharekit::store::HashedStore;
//!
//! let mut store: HashedStore<String, u32> = HashedStore::new();
//! assert_eq!(store.insert("a".to_string(), 1), None);
//! assert_eq!(store.insert("a".to_string(), 2), Some(1));
//! assert_eq!(store.lookup("a"), Some(&2));
//! assert_eq!(store.count(), 1);
//! ```
use std::borrow::Borrow;
use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::store::metrics::{StoreCounters, StoreMetrics};

/// Unsynchronized key/value map.
#[derive(Debug)]
pub struct HashedStore<K, V> {
    map: FxHashMap<K, V>,
    metrics: StoreCounters,
}

impl<K, V> HashedStore<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            metrics: StoreCounters::default(),
        }
    }

    /// Inserts or overwrites; returns the previous value if the key existed.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let previous = self.map.insert(key, value);
        if previous.is_some() {
            self.metrics.inc_update();
        } else {
            self.metrics.inc_insert();
        }
        previous
    }

    pub fn lookup<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.map.get(key) {
            Some(value) => {
                self.metrics.inc_hit();
                Some(value)
            },
            None => {
                self.metrics.inc_miss();
                None
            },
        }
    }

    /// Like [`lookup`](Self::lookup) but does not count a hit or miss.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key)
    }

    pub fn lookup_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get_mut(key)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.map.remove(key)?;
        self.metrics.inc_remove();
        Some(removed)
    }

    /// Removes without counting a user-visible removal (evictions).
    pub(crate) fn take<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.remove(key)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    pub fn count(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.map.values()
    }

    pub fn metrics(&self) -> StoreMetrics {
        self.metrics.snapshot()
    }

    pub(crate) fn counters(&self) -> &StoreCounters {
        &self.metrics
    }
}

impl<K, V> Default for HashedStore<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
