//! sharekit: bounded shared state for per-thread script replicas.
//!
//! A host runs one logical plugin instance as several replicas, one per
//! worker thread. This crate provides the state those replicas share:
//!
//! - [`dict::SharedDict`]: named, byte-quota bounded key/value dictionaries.
//! - [`pattern::PatternCache`]: an LRU cache of compiled regular expressions.
//! - [`registry::ResourceRegistry`]: the owner of both, activated by the
//!   replica flagged first and torn down by the replica flagged last.
//!
//! Both resource kinds are built on [`bounded::BoundedCache`], a guarded
//! cost-bounded map that either rejects or evicts on overflow.

pub mod bounded;
pub mod config;
pub mod dict;
pub mod ds;
pub mod error;
pub mod instance;
pub mod pattern;
pub mod prelude;
pub mod registry;
pub mod store;

pub use crate::error::{Error, Result};
