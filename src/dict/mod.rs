//! Named shared dictionaries.
//!
//! A [`SharedDict`] is a [`BoundedCache`] keyed by bytes, charged by item
//! size against a fixed byte quota, and configured to reject writes that
//! would exceed it. User data is never evicted behind the caller's back:
//! when the quota is exhausted the write fails with `CapacityExceeded` and the
//! script decides what to delete.
//!
//! ## Example Usage
//!
//! ```rust
//! use sharekit::dict::{SharedDict, Value, ITEM_OVERHEAD};
//!
//! let dict = SharedDict::new("counters", 1024).unwrap();
//! dict.set("greeting", "hello").unwrap();
//! assert_eq!(dict.increment("hits", 2).unwrap(), 2);
//! assert_eq!(dict.increment("hits", 3).unwrap(), 5);
//!
//! assert_eq!(dict.get("greeting").unwrap(), Some(Value::from("hello")));
//! assert_eq!(dict.used(), (8 + 5 + ITEM_OVERHEAD) + (4 + ITEM_OVERHEAD));
//! ```

pub mod value;

use bytes::Bytes;

use crate::bounded::{BoundedCache, OverflowPolicy};
use crate::error::{ConfigError, Error, InvariantError, Result};
use crate::store::StoreMetrics;

pub use value::{ITEM_OVERHEAD, MAX_KEY_LEN, MAX_VALUE_LEN, Value, item_size};

/// Longest accepted dictionary name, in bytes.
pub const MAX_DICT_NAME_LEN: usize = 128;

type DictCost = fn(&Bytes, &Value) -> u64;

fn dict_cost(key: &Bytes, value: &Value) -> u64 {
    item_size(key, value)
}

/// Byte-quota key/value store shared by every replica of an instance.
#[derive(Debug)]
pub struct SharedDict {
    name: String,
    cache: BoundedCache<Bytes, Value, DictCost>,
}

impl SharedDict {
    /// Creates an empty dictionary.
    ///
    /// Fails if the name is empty or longer than [`MAX_DICT_NAME_LEN`], or
    /// if the quota is zero.
    pub fn new(name: impl Into<String>, quota: u64) -> Result<Self, ConfigError> {
        let name = name.into();
        validate_name(&name)?;
        if quota == 0 {
            return Err(ConfigError::new(format!(
                "dictionary `{name}`: quota must be > 0"
            )));
        }
        let cost: DictCost = dict_cost;
        Ok(Self {
            name,
            cache: BoundedCache::new(quota, OverflowPolicy::Reject, cost),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quota(&self) -> u64 {
        self.cache.limit()
    }

    /// Bytes currently charged against the quota.
    pub fn used(&self) -> u64 {
        self.cache.size()
    }

    pub fn count(&self) -> usize {
        self.cache.count()
    }

    pub fn stats(&self) -> StoreMetrics {
        self.cache.stats()
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Value>> {
        self.cache.get(key.as_ref())
    }

    /// Stores `value` under `key`, overwriting any previous value.
    ///
    /// # Errors
    ///
    /// - [`Error::ItemTooLarge`] if the item could never fit: its size alone
    ///   exceeds the quota, or the key or text is longer than 65535 bytes.
    ///   Deleting other keys will not help.
    /// - [`Error::CapacityExceeded`] if it would fit in an empty dictionary
    ///   but not next to what is stored now.
    ///
    /// Either way the dictionary is left unchanged.
    pub fn set(&self, key: impl AsRef<[u8]>, value: impl Into<Value>) -> Result<()> {
        let key = key.as_ref();
        let value = value.into();
        check_item(key, &value)?;
        self.cache.set(Bytes::copy_from_slice(key), value)
    }

    /// Stores `value` only if `key` is absent; returns `false` otherwise.
    pub fn add(&self, key: impl AsRef<[u8]>, value: impl Into<Value>) -> Result<bool> {
        let key = key.as_ref();
        let value = value.into();
        check_item(key, &value)?;
        self.cache.insert_if_absent(Bytes::copy_from_slice(key), value)
    }

    /// Atomically adds `delta` to the integer at `key` and returns the result.
    ///
    /// A missing key counts as zero. Arithmetic wraps on overflow.
    pub fn increment(&self, key: impl AsRef<[u8]>, delta: i64) -> Result<i64> {
        let key = key.as_ref();
        check_item(key, &Value::Integer(delta))?;
        let mut total = 0;
        self.cache.update(Bytes::copy_from_slice(key), |current| {
            total = match current {
                None => delta,
                Some(Value::Integer(n)) => n.wrapping_add(delta),
                Some(Value::Text(_)) => return Err(Error::TypeMismatch),
            };
            Ok(Value::Integer(total))
        })?;
        Ok(total)
    }

    /// Removes `key`; returns `true` if it was present.
    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        self.cache.delete(key.as_ref())
    }

    /// Removes every item and resets `used` to zero.
    pub fn flush_all(&self) -> Result<()> {
        self.cache.clear()
    }

    /// Up to `max` keys in no particular order; `max == 0` returns all.
    pub fn keys(&self, max: usize) -> Result<Vec<Bytes>> {
        self.cache.keys(max)
    }

    pub fn is_retired(&self) -> bool {
        self.cache.is_retired()
    }

    pub fn check_invariants(&self) -> std::result::Result<(), InvariantError> {
        self.cache.check_invariants()
    }

    pub(crate) fn retire(&self) -> bool {
        self.cache.retire()
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::new("dictionary name must not be empty"));
    }
    if name.len() > MAX_DICT_NAME_LEN {
        return Err(ConfigError::new(format!(
            "dictionary name `{name}` is longer than {MAX_DICT_NAME_LEN} bytes"
        )));
    }
    Ok(())
}

fn check_item(key: &[u8], value: &Value) -> Result<()> {
    if key.len() > MAX_KEY_LEN {
        return Err(Error::ItemTooLarge {
            cost: key.len() as u64,
            limit: MAX_KEY_LEN as u64,
        });
    }
    if value.payload_len() > MAX_VALUE_LEN {
        return Err(Error::ItemTooLarge {
            cost: value.payload_len() as u64,
            limit: MAX_VALUE_LEN as u64,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_example_rejects_second_item() {
        let dict = SharedDict::new("example", 100).unwrap();
        dict.set("a", vec![b'x'; 60]).unwrap();
        let used = 1 + 60 + ITEM_OVERHEAD;
        assert_eq!(dict.used(), used);

        let err = dict.set("b", vec![b'y'; 50]).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { .. }));
        assert_eq!(dict.used(), used);
        assert_eq!(dict.get("b").unwrap(), None);
        assert_eq!(dict.count(), 1);
    }

    #[test]
    fn item_larger_than_quota_is_too_large_not_over_capacity() {
        let dict = SharedDict::new("d", 64).unwrap();
        let err = dict.set("k", vec![b'x'; 64]).unwrap_err();
        assert_eq!(
            err,
            Error::ItemTooLarge {
                cost: 1 + 64 + ITEM_OVERHEAD,
                limit: 64
            }
        );

        dict.set("a", vec![b'x'; 20]).unwrap();
        let err = dict.set("b", vec![b'y'; 20]).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { .. }));
        assert_eq!(dict.count(), 1);
    }

    #[test]
    fn set_get_overwrite_delete() {
        let dict = SharedDict::new("d", 1024).unwrap();
        dict.set("k", "v1").unwrap();
        dict.set("k", 42i64).unwrap();
        assert_eq!(dict.get("k").unwrap(), Some(Value::Integer(42)));
        assert_eq!(dict.used(), 1 + ITEM_OVERHEAD);

        assert!(dict.delete("k").unwrap());
        assert!(!dict.delete("k").unwrap());
        assert_eq!(dict.used(), 0);
        dict.check_invariants().unwrap();
    }

    #[test]
    fn increment_starts_from_zero() {
        let dict = SharedDict::new("d", 1024).unwrap();
        assert_eq!(dict.increment("n", 5).unwrap(), 5);
        assert_eq!(dict.increment("n", -7).unwrap(), -2);
        assert_eq!(dict.get("n").unwrap(), Some(Value::Integer(-2)));
    }

    #[test]
    fn increment_returns_the_stored_total() {
        let dict = SharedDict::new("d", 1024).unwrap();
        for expected in 1..=4 {
            assert_eq!(dict.increment("n", 1).unwrap(), expected);
            assert_eq!(dict.get("n").unwrap(), Some(Value::Integer(expected)));
        }
    }

    #[test]
    fn increment_wraps() {
        let dict = SharedDict::new("d", 1024).unwrap();
        dict.set("n", i64::MAX).unwrap();
        assert_eq!(dict.increment("n", 1).unwrap(), i64::MIN);
    }

    #[test]
    fn increment_on_text_is_type_mismatch() {
        let dict = SharedDict::new("d", 1024).unwrap();
        dict.set("s", "abc").unwrap();
        let used = dict.used();
        assert_eq!(dict.increment("s", 1), Err(Error::TypeMismatch));
        assert_eq!(dict.get("s").unwrap(), Some(Value::from("abc")));
        assert_eq!(dict.used(), used);
    }

    #[test]
    fn increment_new_key_respects_quota() {
        let dict = SharedDict::new("d", ITEM_OVERHEAD + 1).unwrap();
        assert_eq!(dict.increment("a", 1).unwrap(), 1);
        assert_eq!(dict.increment("a", 1).unwrap(), 2);
        assert!(matches!(
            dict.increment("b", 1),
            Err(Error::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn add_only_inserts_missing_keys() {
        let dict = SharedDict::new("d", 1024).unwrap();
        assert!(dict.add("k", "first").unwrap());
        assert!(!dict.add("k", "second").unwrap());
        assert_eq!(dict.get("k").unwrap(), Some(Value::from("first")));
    }

    #[test]
    fn flush_all_resets_usage() {
        let dict = SharedDict::new("d", 1024).unwrap();
        for i in 0..10i64 {
            dict.set(format!("k{i}"), i).unwrap();
        }
        dict.flush_all().unwrap();
        assert_eq!(dict.used(), 0);
        assert_eq!(dict.count(), 0);
        assert!(dict.keys(0).unwrap().is_empty());
    }

    #[test]
    fn keys_lists_stored_keys() {
        let dict = SharedDict::new("d", 1024).unwrap();
        dict.set("a", 1i64).unwrap();
        dict.set("b", 2i64).unwrap();
        let mut keys = dict.keys(0).unwrap();
        keys.sort();
        assert_eq!(keys, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
        assert_eq!(dict.keys(1).unwrap().len(), 1);
    }

    #[test]
    fn oversized_key_and_value_are_rejected() {
        let dict = SharedDict::new("d", 1 << 20).unwrap();
        let long_key = vec![b'k'; MAX_KEY_LEN + 1];
        assert!(matches!(
            dict.set(&long_key, 1i64),
            Err(Error::ItemTooLarge { .. })
        ));
        let long_value = vec![b'v'; MAX_VALUE_LEN + 1];
        assert!(matches!(
            dict.set("k", long_value),
            Err(Error::ItemTooLarge { .. })
        ));
        assert_eq!(dict.count(), 0);
    }

    #[test]
    fn invalid_configuration_is_refused() {
        assert!(SharedDict::new("", 10).is_err());
        assert!(SharedDict::new("x".repeat(MAX_DICT_NAME_LEN + 1), 10).is_err());
        assert!(SharedDict::new("x".repeat(MAX_DICT_NAME_LEN), 10).is_ok());
        assert!(SharedDict::new("zero", 0).is_err());
    }

    #[test]
    fn retired_dictionary_refuses_access() {
        let dict = SharedDict::new("d", 1024).unwrap();
        dict.set("k", 1i64).unwrap();
        assert!(dict.retire());
        assert!(dict.is_retired());
        assert!(dict.get("k").unwrap_err().is_fatal());
        assert!(dict.flush_all().is_err());
    }
}
