//! Storage backends for bounded caches.
//!
//! Stores focus on key/value ownership and lookup semantics, while
//! [`BoundedCache`](crate::bounded::BoundedCache) manages capacity, eviction
//! order and locking. This keeps policy logic independent of how values are
//! stored.

pub mod hashed;
pub mod metrics;

pub use hashed::HashedStore;
pub use metrics::StoreMetrics;
