//! Compiled-pattern cache.
//!
//! Compiling a regular expression is expensive relative to matching it, and
//! scripts tend to reuse a small set of patterns across requests. The
//! [`PatternCache`] keeps up to `max_entries` compiled matchers keyed by
//! `(pattern, flags)` and evicts the least recently used one when full.
//! Entries are derived data, so eviction is silent: the next request simply
//! recompiles.
//!
//! Compilation runs without the cache guard held. Two threads missing on the
//! same key may both compile; the first insert wins and the other thread
//! receives that handle.
//!
//! ## Example Usage
//!
//! ```rust
//! use sharekit::pattern::{PatternCache, PatternFlags};
//!
//! let cache = PatternCache::new(64).unwrap();
//! let handle = cache.compile_or_get(r"^/api/(\w+)", PatternFlags::empty()).unwrap();
//! let caps = handle.captures(b"/api/users").unwrap();
//! assert_eq!(caps.get(1), Some(5..10));
//! assert_eq!(cache.count(), 1);
//! ```

pub mod compiled;
pub mod flags;

use std::sync::Arc;

use tracing::debug;

use crate::bounded::{BoundedCache, OverflowPolicy};
use crate::error::{ConfigError, InvariantError, Result};
use crate::store::StoreMetrics;

pub use compiled::{CaptureSet, CompiledPattern, MAX_CAPTURE_GROUPS, PatternKey, PatternKeyView};
pub use flags::PatternFlags;

/// Default number of resident compiled patterns.
pub const DEFAULT_MAX_ENTRIES: usize = 64;

/// Shared handle to a compiled pattern. Stays valid after eviction.
pub type MatcherHandle = Arc<CompiledPattern>;

type PatternCost = fn(&PatternKey, &MatcherHandle) -> u64;

fn unit_cost(_: &PatternKey, _: &MatcherHandle) -> u64 {
    1
}

/// Entry-count bounded LRU cache of compiled patterns.
#[derive(Debug)]
pub struct PatternCache {
    cache: BoundedCache<PatternKey, MatcherHandle, PatternCost>,
}

impl PatternCache {
    pub fn new(max_entries: usize) -> Result<Self, ConfigError> {
        if max_entries == 0 {
            return Err(ConfigError::new("pattern cache: max_entries must be > 0"));
        }
        let cost: PatternCost = unit_cost;
        Ok(Self {
            cache: BoundedCache::new(max_entries as u64, OverflowPolicy::EvictLru, cost),
        })
    }

    pub fn max_entries(&self) -> usize {
        self.cache.limit() as usize
    }

    pub fn count(&self) -> usize {
        self.cache.count()
    }

    pub fn stats(&self) -> StoreMetrics {
        self.cache.stats()
    }

    /// Returns the cached matcher for `(pattern, flags)`, compiling it on a
    /// miss. Compile failures are returned and nothing is cached.
    ///
    /// Hits are looked up by a borrowed `(pattern, flags)` view; the owned
    /// key is only built on a miss.
    pub fn compile_or_get(&self, pattern: &str, flags: PatternFlags) -> Result<MatcherHandle> {
        if let Some(handle) = self.get(pattern, flags)? {
            return Ok(handle);
        }
        let compiled = Arc::new(CompiledPattern::compile(pattern, flags)?);
        debug!(pattern, flags = %flags, "compiled pattern");
        self.cache.get_or_insert(compiled.key().clone(), compiled)
    }

    /// Same as [`compile_or_get`](Self::compile_or_get) with flags given as
    /// an option string such as `"i"`.
    pub fn compile_with_options(&self, pattern: &str, options: &str) -> Result<MatcherHandle> {
        let flags = PatternFlags::parse(options)?;
        self.compile_or_get(pattern, flags)
    }

    /// Cached matcher without compiling; a hit refreshes recency.
    pub fn get(&self, pattern: &str, flags: PatternFlags) -> Result<Option<MatcherHandle>> {
        let probe = (pattern, flags);
        self.cache.get(&probe as &dyn PatternKeyView)
    }

    /// Whether `(pattern, flags)` is resident. Does not refresh recency.
    pub fn contains(&self, pattern: &str, flags: PatternFlags) -> Result<bool> {
        let probe = (pattern, flags);
        self.cache.contains(&probe as &dyn PatternKeyView)
    }

    /// Matches `subject` against `handle`, returning at most
    /// [`MAX_CAPTURE_GROUPS`] capture spans.
    pub fn captures(&self, handle: &MatcherHandle, subject: &[u8]) -> Option<CaptureSet> {
        handle.captures(subject)
    }

    /// Compiles (or reuses) `pattern` and matches it against `subject`.
    pub fn find(
        &self,
        pattern: &str,
        flags: PatternFlags,
        subject: &[u8],
    ) -> Result<Option<CaptureSet>> {
        let handle = self.compile_or_get(pattern, flags)?;
        Ok(handle.captures(subject))
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

impl Default for PatternCache {
    fn default() -> Self {
        let cost: PatternCost = unit_cost;
        Self {
            cache: BoundedCache::new(DEFAULT_MAX_ENTRIES as u64, OverflowPolicy::EvictLru, cost),
        }
    }
}
