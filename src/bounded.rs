//! # Bounded Concurrent Cache
//!
//! One parameterized cache backs both shared dictionaries and the compiled
//! pattern cache. It is configured with a cost function, a limit on the
//! summed cost, and an [`OverflowPolicy`]:
//!
//! ```text
//!   ┌───────────────────────────────────────────────────────────────┐
//!   │                   BoundedCache<K, V, F>                       │
//!   │                                                               │
//!   │   limit: u64        policy: Reject | EvictLru    cost_fn: F   │
//!   │                                                               │
//!   │   ┌───────────────────────────────────────────────────────┐   │
//!   │   │              Mutex<CacheState<K, V>>                  │   │
//!   │   │                                                       │   │
//!   │   │   HashedStore<K, Slot<V>>   K -> { value, cost, node }│   │
//!   │   │   RecencyList<K>            MRU ... LRU (EvictLru)    │   │
//!   │   │   total: u64                sum of live costs         │   │
//!   │   │   retired: bool             set once by retire()      │   │
//!   │   └───────────────────────────────────────────────────────┘   │
//!   └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Overflow Policies
//!
//! | Policy     | Write that does not fit                  | `get` side effect |
//! |------------|------------------------------------------|-------------------|
//! | `Reject`   | `CapacityExceeded`, store untouched      | none              |
//! | `EvictLru` | evicts from the LRU end until it fits    | moves to MRU      |
//!
//! Under both policies a single item whose cost alone exceeds the limit is
//! refused with `ItemTooLarge`.
//!
//! ## Thread Safety
//!
//! Every operation holds the guard for its full duration, reads included.
//! After [`BoundedCache::retire`] every operation fails with
//! `RegistryUnavailable`; retirement itself takes the guard, so it waits for
//! any in-flight caller to finish first.
//!
//! ## Example Usage
//!
//! ```rust
//! use sharekit::bounded::{BoundedCache, OverflowPolicy};
//!
//! let cache = BoundedCache::new(2, OverflowPolicy::EvictLru, |_: &u32, _: &u32| 1);
//! cache.set(1, 10).unwrap();
//! cache.set(2, 20).unwrap();
//! cache.get(&1).unwrap();
//! cache.set(3, 30).unwrap();
//!
//! assert!(cache.contains(&1).unwrap());
//! assert!(!cache.contains(&2).unwrap());
//! ```

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;

use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

use crate::ds::{RecencyList, SlotId};
use crate::error::{Error, InvariantError, Result};
use crate::registry::LifecycleState;
use crate::store::{HashedStore, StoreMetrics};

/// What to do when a write would push the total cost past the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverflowPolicy {
    /// Fail the write and leave the cache untouched.
    Reject,
    /// Evict least-recently-used entries until the write fits.
    EvictLru,
}

#[derive(Debug)]
struct Slot<V> {
    value: V,
    cost: u64,
    node: Option<SlotId>,
}

#[derive(Debug)]
struct CacheState<K, V> {
    store: HashedStore<K, Slot<V>>,
    recency: RecencyList<K>,
    total: u64,
    retired: bool,
}

/// Capacity-limited map guarded by a single mutex.
pub struct BoundedCache<K, V, F> {
    guard: Mutex<CacheState<K, V>>,
    limit: u64,
    policy: OverflowPolicy,
    cost_fn: F,
}

impl<K, V, F> BoundedCache<K, V, F>
where
    K: Eq + Hash + Clone,
    V: Clone,
    F: Fn(&K, &V) -> u64,
{
    pub fn new(limit: u64, policy: OverflowPolicy, cost_fn: F) -> Self {
        Self {
            guard: Mutex::new(CacheState {
                store: HashedStore::new(),
                recency: RecencyList::new(),
                total: 0,
                retired: false,
            }),
            limit,
            policy,
            cost_fn,
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Fetches a clone of the value. On `EvictLru` a hit becomes the most
    /// recently used entry.
    pub fn get<Q>(&self, key: &Q) -> Result<Option<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let (value, node) = match state.store.lookup(key) {
            Some(slot) => (slot.value.clone(), slot.node),
            None => return Ok(None),
        };
        if let Some(id) = node {
            state.recency.move_to_front(id);
        }
        Ok(Some(value))
    }

    /// Fetches a clone of the value without touching recency or hit counters.
    pub fn peek<Q>(&self, key: &Q) -> Result<Option<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = self.lock()?;
        Ok(guard.store.peek(key).map(|slot| slot.value.clone()))
    }

    pub fn contains<Q>(&self, key: &Q) -> Result<bool>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = self.lock()?;
        Ok(guard.store.contains(key))
    }

    /// Inserts or overwrites `key` under the configured overflow policy.
    pub fn set(&self, key: K, value: V) -> Result<()> {
        let cost = (self.cost_fn)(&key, &value);
        let mut guard = self.lock()?;
        self.store_locked(&mut guard, key, value, cost)
    }

    /// Inserts only if `key` is absent. Returns `false` when it was present.
    pub fn insert_if_absent(&self, key: K, value: V) -> Result<bool> {
        let cost = (self.cost_fn)(&key, &value);
        let mut guard = self.lock()?;
        if guard.store.contains(&key) {
            return Ok(false);
        }
        self.store_locked(&mut guard, key, value, cost)?;
        Ok(true)
    }

    /// Returns the cached value for `key`, or stores `value` and returns it.
    ///
    /// A hit counts as a use for recency purposes.
    pub fn get_or_insert(&self, key: K, value: V) -> Result<V> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        if let Some(slot) = state.store.lookup(&key) {
            let (existing, node) = (slot.value.clone(), slot.node);
            if let Some(id) = node {
                state.recency.move_to_front(id);
            }
            return Ok(existing);
        }
        let cost = (self.cost_fn)(&key, &value);
        self.store_locked(state, key, value.clone(), cost)?;
        Ok(value)
    }

    /// Read-modify-write under a single guard acquisition.
    ///
    /// `f` receives the current value (if any) and returns the replacement.
    /// If `f` fails, or the replacement does not fit, nothing changes.
    pub fn update<G>(&self, key: K, f: G) -> Result<V>
    where
        G: FnOnce(Option<&V>) -> Result<V>,
    {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let next = f(state.store.peek(&key).map(|slot| &slot.value))?;
        let cost = (self.cost_fn)(&key, &next);
        self.store_locked(state, key, next.clone(), cost)?;
        Ok(next)
    }

    /// Removes `key`; returns `true` if it was present.
    pub fn delete<Q>(&self, key: &Q) -> Result<bool>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        match state.store.remove(key) {
            Some(slot) => {
                state.total -= slot.cost;
                if let Some(id) = slot.node {
                    state.recency.remove(id);
                }
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Drops every entry and resets the total to zero.
    pub fn clear(&self) -> Result<()> {
        let mut guard = self.lock()?;
        guard.store.clear();
        guard.recency.clear();
        guard.total = 0;
        Ok(())
    }

    /// Up to `max` keys in no particular order; `max == 0` means all.
    pub fn keys(&self, max: usize) -> Result<Vec<K>> {
        let guard = self.lock()?;
        let take = if max == 0 { usize::MAX } else { max };
        Ok(guard.store.keys().take(take).cloned().collect())
    }

    /// Current total cost.
    pub fn size(&self) -> u64 {
        self.guard.lock().total
    }

    pub fn count(&self) -> usize {
        self.guard.lock().store.count()
    }

    pub fn stats(&self) -> StoreMetrics {
        self.guard.lock().store.metrics()
    }

    /// Drains the cache and refuses all further use.
    ///
    /// Returns `false` if it was already retired.
    pub fn retire(&self) -> bool {
        let mut guard = self.guard.lock();
        if guard.retired {
            return false;
        }
        guard.store.clear();
        guard.recency.clear();
        guard.total = 0;
        guard.retired = true;
        true
    }

    pub fn is_retired(&self) -> bool {
        self.guard.lock().retired
    }

    /// Verifies the bookkeeping against the stored entries.
    pub fn check_invariants(&self) -> std::result::Result<(), InvariantError> {
        let guard = self.guard.lock();
        let summed: u64 = guard.store.values().map(|slot| slot.cost).sum();
        if summed != guard.total {
            return Err(InvariantError::new(format!(
                "total {} does not match summed cost {}",
                guard.total, summed
            )));
        }
        if guard.total > self.limit {
            return Err(InvariantError::new(format!(
                "total {} exceeds limit {}",
                guard.total, self.limit
            )));
        }
        match self.policy {
            OverflowPolicy::Reject => {
                if !guard.recency.is_empty() {
                    return Err(InvariantError::new("reject cache tracks recency"));
                }
            },
            OverflowPolicy::EvictLru => {
                if guard.recency.len() != guard.store.count() {
                    return Err(InvariantError::new(format!(
                        "recency list holds {} keys, store holds {}",
                        guard.recency.len(),
                        guard.store.count()
                    )));
                }
                for key in guard.store.keys() {
                    let linked = guard
                        .store
                        .peek(key)
                        .and_then(|slot| slot.node)
                        .and_then(|id| guard.recency.get(id));
                    if linked != Some(key) {
                        return Err(InvariantError::new("store entry not linked in recency list"));
                    }
                }
            },
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheState<K, V>>> {
        let guard = self.guard.lock();
        if guard.retired {
            return Err(Error::RegistryUnavailable {
                state: LifecycleState::TornDown,
            });
        }
        Ok(guard)
    }

    fn store_locked(&self, state: &mut CacheState<K, V>, key: K, value: V, cost: u64) -> Result<()> {
        if cost > self.limit {
            state.store.counters().inc_rejection();
            return Err(Error::ItemTooLarge {
                cost,
                limit: self.limit,
            });
        }
        match self.policy {
            OverflowPolicy::Reject => {
                let old_cost = state.store.peek(&key).map_or(0, |slot| slot.cost);
                let next_total = state.total - old_cost + cost;
                if next_total > self.limit {
                    state.store.counters().inc_rejection();
                    return Err(Error::CapacityExceeded {
                        requested: cost,
                        used: state.total,
                        limit: self.limit,
                    });
                }
                state.store.insert(
                    key,
                    Slot {
                        value,
                        cost,
                        node: None,
                    },
                );
                state.total = next_total;
            },
            OverflowPolicy::EvictLru => {
                let existing = state
                    .store
                    .lookup_mut(&key)
                    .map(|slot| (slot.cost, slot.node));
                match existing {
                    Some((old_cost, node)) => {
                        // Pin the entry at the MRU end; with its own cost
                        // subtracted it can only be the LRU entry when the
                        // total is zero, which ends the loop below.
                        state.total -= old_cost;
                        if let Some(id) = node {
                            state.recency.move_to_front(id);
                        }
                        while state.total + cost > self.limit {
                            if self.evict_one(state).is_none() {
                                break;
                            }
                        }
                        if let Some(slot) = state.store.lookup_mut(&key) {
                            slot.value = value;
                            slot.cost = cost;
                        }
                        state.store.counters().inc_update();
                    },
                    None => {
                        while state.total + cost > self.limit {
                            if self.evict_one(state).is_none() {
                                break;
                            }
                        }
                        let node = state.recency.push_front(key.clone());
                        state.store.insert(
                            key,
                            Slot {
                                value,
                                cost,
                                node: Some(node),
                            },
                        );
                    },
                }
                state.total += cost;
            },
        }
        Ok(())
    }

    fn evict_one(&self, state: &mut CacheState<K, V>) -> Option<K> {
        let key = state.recency.pop_back()?;
        if let Some(slot) = state.store.take(&key) {
            state.total -= slot.cost;
            state.store.counters().inc_eviction();
            trace!(cost = slot.cost, total = state.total, "evicted least recently used entry");
        }
        Some(key)
    }
}

impl<K, V, F> fmt::Debug for BoundedCache<K, V, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.guard.lock();
        f.debug_struct("BoundedCache")
            .field("limit", &self.limit)
            .field("policy", &self.policy)
            .field("total", &state.total)
            .field("retired", &state.retired)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type ByteCache = BoundedCache<&'static str, String, fn(&&'static str, &String) -> u64>;

    fn byte_cost(key: &&'static str, value: &String) -> u64 {
        (key.len() + value.len()) as u64
    }

    fn unit_cost(_: &u32, _: &u32) -> u64 {
        1
    }

    fn reject_cache(limit: u64) -> ByteCache {
        let cost: fn(&&'static str, &String) -> u64 = byte_cost;
        BoundedCache::new(limit, OverflowPolicy::Reject, cost)
    }

    fn lru_cache(limit: u64) -> BoundedCache<u32, u32, fn(&u32, &u32) -> u64> {
        let cost: fn(&u32, &u32) -> u64 = unit_cost;
        BoundedCache::new(limit, OverflowPolicy::EvictLru, cost)
    }

    // ==============================================
    // Reject policy
    // ==============================================

    #[test]
    fn reject_tracks_total_cost() {
        let cache = reject_cache(100);
        cache.set("a", "xxxx".into()).unwrap();
        cache.set("bb", "yy".into()).unwrap();
        assert_eq!(cache.size(), 9);
        assert_eq!(cache.count(), 2);

        cache.set("a", "x".into()).unwrap();
        assert_eq!(cache.size(), 6);

        assert!(cache.delete("bb").unwrap());
        assert!(!cache.delete("bb").unwrap());
        assert_eq!(cache.size(), 2);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn reject_failure_leaves_state_untouched() {
        let cache = reject_cache(10);
        cache.set("a", "12345".into()).unwrap();

        let err = cache.set("b", "12345".into()).unwrap_err();
        assert_eq!(
            err,
            Error::CapacityExceeded {
                requested: 6,
                used: 6,
                limit: 10
            }
        );
        assert_eq!(cache.size(), 6);
        assert_eq!(cache.count(), 1);
        assert_eq!(cache.get("b").unwrap(), None);
        assert_eq!(cache.stats().rejections, 1);
    }

    #[test]
    fn reject_overwrite_failure_keeps_old_value() {
        let cache = reject_cache(10);
        cache.set("a", "123".into()).unwrap();
        cache.set("b", "123".into()).unwrap();

        assert!(cache.set("a", "1234567".into()).is_err());
        assert_eq!(cache.get("a").unwrap(), Some("123".to_string()));
        assert_eq!(cache.size(), 8);
    }

    #[test]
    fn overwrite_that_shrinks_always_fits() {
        let cache = reject_cache(10);
        cache.set("a", "123456789".into()).unwrap();
        cache.set("a", "1".into()).unwrap();
        assert_eq!(cache.size(), 2);
    }

    #[test]
    fn single_item_over_limit_is_too_large() {
        let cache = reject_cache(4);
        assert_eq!(
            cache.set("a", "1234".into()),
            Err(Error::ItemTooLarge { cost: 5, limit: 4 })
        );
        assert_eq!(cache.count(), 0);
    }

    #[test]
    fn insert_if_absent_does_not_overwrite() {
        let cache = reject_cache(100);
        assert!(cache.insert_if_absent("a", "1".into()).unwrap());
        assert!(!cache.insert_if_absent("a", "2".into()).unwrap());
        assert_eq!(cache.peek("a").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn update_error_leaves_value() {
        let cache = reject_cache(100);
        cache.set("a", "1".into()).unwrap();
        let err = cache
            .update("a", |_| Err(Error::TypeMismatch))
            .unwrap_err();
        assert_eq!(err, Error::TypeMismatch);
        assert_eq!(cache.peek("a").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn update_sees_current_value() {
        let cache = reject_cache(100);
        cache.set("a", "ab".into()).unwrap();
        let next = cache
            .update("a", |current| {
                Ok(format!("{}c", current.cloned().unwrap_or_default()))
            })
            .unwrap();
        assert_eq!(next, "abc");
        assert_eq!(cache.size(), 4);
    }

    // ==============================================
    // EvictLru policy
    // ==============================================

    #[test]
    fn lru_evicts_least_recently_used() {
        let cache = lru_cache(2);
        cache.set(1, 1).unwrap();
        cache.set(2, 2).unwrap();
        assert_eq!(cache.get(&1).unwrap(), Some(1));
        cache.set(3, 3).unwrap();

        assert!(cache.contains(&1).unwrap());
        assert!(!cache.contains(&2).unwrap());
        assert!(cache.contains(&3).unwrap());
        assert_eq!(cache.stats().evictions, 1);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn lru_ties_break_by_insertion_order() {
        let cache = lru_cache(3);
        for k in 1..=3 {
            cache.set(k, k).unwrap();
        }
        cache.set(4, 4).unwrap();
        cache.set(5, 5).unwrap();
        assert!(!cache.contains(&1).unwrap());
        assert!(!cache.contains(&2).unwrap());
        assert_eq!(cache.count(), 3);
    }

    #[test]
    fn peek_does_not_refresh_recency() {
        let cache = lru_cache(2);
        cache.set(1, 1).unwrap();
        cache.set(2, 2).unwrap();
        cache.peek(&1).unwrap();
        cache.set(3, 3).unwrap();
        assert!(!cache.contains(&1).unwrap());
    }

    #[test]
    fn lru_overwrite_refreshes_and_keeps_count() {
        let cache = lru_cache(2);
        cache.set(1, 1).unwrap();
        cache.set(2, 2).unwrap();
        cache.set(1, 10).unwrap();
        cache.set(3, 3).unwrap();
        assert_eq!(cache.get(&1).unwrap(), Some(10));
        assert!(!cache.contains(&2).unwrap());
        cache.check_invariants().unwrap();
    }

    #[test]
    fn lru_weighted_eviction_frees_enough_room() {
        let cache: BoundedCache<u32, u64, _> =
            BoundedCache::new(10, OverflowPolicy::EvictLru, |_: &u32, v: &u64| *v);
        cache.set(1, 4).unwrap();
        cache.set(2, 4).unwrap();
        cache.set(3, 8).unwrap();
        assert_eq!(cache.count(), 1);
        assert_eq!(cache.size(), 8);
        assert_eq!(
            cache.set(4, 11),
            Err(Error::ItemTooLarge { cost: 11, limit: 10 })
        );
        assert!(cache.contains(&3).unwrap());
        cache.check_invariants().unwrap();
    }

    #[test]
    fn lru_growing_overwrite_evicts_others_only() {
        let cache: BoundedCache<u32, u64, _> =
            BoundedCache::new(10, OverflowPolicy::EvictLru, |_: &u32, v: &u64| *v);
        cache.set(1, 3).unwrap();
        cache.set(2, 3).unwrap();
        cache.set(1, 9).unwrap();
        assert_eq!(cache.peek(&1).unwrap(), Some(9));
        assert!(!cache.contains(&2).unwrap());
        assert_eq!(cache.size(), 9);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn get_or_insert_returns_existing() {
        let cache = lru_cache(4);
        assert_eq!(cache.get_or_insert(1, 10).unwrap(), 10);
        assert_eq!(cache.get_or_insert(1, 20).unwrap(), 10);
        assert_eq!(cache.count(), 1);
    }

    // ==============================================
    // Shared behavior
    // ==============================================

    #[test]
    fn retire_blocks_further_use() {
        let cache = lru_cache(4);
        cache.set(1, 1).unwrap();
        assert!(cache.retire());
        assert!(!cache.retire());
        assert!(cache.is_retired());
        assert_eq!(cache.count(), 0);

        let err = cache.get(&1).unwrap_err();
        assert!(err.is_fatal());
        assert!(cache.set(2, 2).is_err());
        assert!(cache.delete(&1).is_err());
        assert!(cache.clear().is_err());
    }

    #[test]
    fn keys_respects_max() {
        let cache = lru_cache(10);
        for k in 0..5 {
            cache.set(k, k).unwrap();
        }
        assert_eq!(cache.keys(0).unwrap().len(), 5);
        assert_eq!(cache.keys(3).unwrap().len(), 3);
    }

    #[test]
    fn clear_resets_total() {
        let cache = reject_cache(100);
        cache.set("a", "abc".into()).unwrap();
        cache.clear().unwrap();
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.count(), 0);
        cache.check_invariants().unwrap();
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Set(u32, u64),
            Get(u32),
            Delete(u32),
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u32..20, 0u64..12).prop_map(|(k, v)| Op::Set(k, v)),
                (0u32..20).prop_map(Op::Get),
                (0u32..20).prop_map(Op::Delete),
            ]
        }

        fn run(policy: OverflowPolicy, limit: u64, ops: Vec<Op>) -> std::result::Result<(), TestCaseError> {
            let cache: BoundedCache<u32, u64, _> =
                BoundedCache::new(limit, policy, |_: &u32, v: &u64| *v);
            for op in ops {
                match op {
                    Op::Set(k, v) => {
                        let _ = cache.set(k, v);
                    },
                    Op::Get(k) => {
                        let _ = cache.get(&k);
                    },
                    Op::Delete(k) => {
                        let _ = cache.delete(&k);
                    },
                }
                prop_assert!(cache.size() <= limit);
                prop_assert!(cache.check_invariants().is_ok());
            }
            Ok(())
        }

        proptest! {
            #[cfg_attr(miri, ignore)]
            #[test]
            fn prop_reject_invariants_hold(
                limit in 1u64..40,
                ops in prop::collection::vec(op_strategy(), 0..100)
            ) {
                run(OverflowPolicy::Reject, limit, ops)?;
            }

            #[cfg_attr(miri, ignore)]
            #[test]
            fn prop_evict_invariants_hold(
                limit in 1u64..40,
                ops in prop::collection::vec(op_strategy(), 0..100)
            ) {
                run(OverflowPolicy::EvictLru, limit, ops)?;
            }

            #[cfg_attr(miri, ignore)]
            #[test]
            fn prop_failed_reject_is_atomic(
                limit in 1u64..40,
                seed in prop::collection::vec((0u32..10, 0u64..12), 0..20),
                key in 0u32..10,
                value in 0u64..40
            ) {
                let cache: BoundedCache<u32, u64, _> =
                    BoundedCache::new(limit, OverflowPolicy::Reject, |_: &u32, v: &u64| *v);
                for (k, v) in seed {
                    let _ = cache.set(k, v);
                }
                let before_size = cache.size();
                let before_value = cache.peek(&key).unwrap();
                if cache.set(key, value).is_err() {
                    prop_assert_eq!(cache.size(), before_size);
                    prop_assert_eq!(cache.peek(&key).unwrap(), before_value);
                }
            }
        }
    }
}
