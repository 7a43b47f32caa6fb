//! Error types for the sharekit library.
//!
//! ## Key Components
//!
//! - [`Error`]: Returned by every shared-resource operation. Each variant is
//!   recoverable by the calling script except [`Error::RegistryUnavailable`],
//!   which signals a lifecycle defect in the host.
//! - [`ConfigError`]: Returned when instance configuration is invalid
//!   (zero quota, over-long dictionary name, too many dictionaries).
//! - [`InvariantError`]: Returned by `check_invariants` when internal
//!   bookkeeping disagrees with the stored entries.
//!
//! ## Example Usage
//!
//! ```
//! use sharekit::dict::SharedDict;
//! use sharekit::error::Error;
//!
//! let dict = SharedDict::new("tiny", 64).unwrap();
//! let err = dict.set("k", vec![b'x'; 100]).unwrap_err();
//! assert!(matches!(err, Error::ItemTooLarge { .. }));
//! ```

use std::fmt;

use crate::registry::LifecycleState;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced to the scripting layer.
///
/// Nothing in this crate retries or swallows these; they are returned to the
/// immediate caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A dictionary write would push `used` past the quota. The dictionary is
    /// left exactly as it was before the call.
    #[error("capacity exceeded: item costs {requested} bytes, {used} of {limit} already in use")]
    CapacityExceeded {
        requested: u64,
        used: u64,
        limit: u64,
    },

    /// A single item can never fit, regardless of what else is stored.
    #[error("item too large: cost {cost} exceeds limit {limit}")]
    ItemTooLarge { cost: u64, limit: u64 },

    /// `increment` hit a slot holding text.
    #[error("type mismatch: value is not an integer")]
    TypeMismatch,

    /// Invalid pattern, unknown flag, or too many capture groups.
    #[error("failed to compile pattern `{pattern}`: {reason}")]
    Compile { pattern: String, reason: String },

    /// Same dictionary name declared twice with different quotas.
    #[error("dictionary `{name}` is registered with quota {registered}, declared with {declared}")]
    ConfigConflict {
        name: String,
        registered: u64,
        declared: u64,
    },

    /// A name was referenced that no replica ever registered.
    #[error("shared resource `{name}` is not registered")]
    NotFound { name: String },

    /// The registry (or an entry retired with it) is not active.
    #[error("resource registry is {state}")]
    RegistryUnavailable { state: LifecycleState },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub(crate) fn compile(pattern: &str, reason: impl fmt::Display) -> Self {
        Error::Compile {
            pattern: pattern.to_owned(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn not_found(name: &str) -> Self {
        Error::NotFound {
            name: name.to_owned(),
        }
    }

    /// Returns `true` for errors that indicate a host defect rather than a
    /// condition the calling script can handle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::RegistryUnavailable { .. })
    }
}

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal cache invariants are violated.
///
/// Produced by [`BoundedCache::check_invariants`](crate::bounded::BoundedCache::check_invariants).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError(String);

impl InvariantError {
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvariantError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when instance configuration is invalid.
///
/// Produced by [`SharedDict::new`](crate::dict::SharedDict::new),
/// [`InstanceSettings::validate`](crate::config::InstanceSettings::validate)
/// and the TOML loader.
///
/// # Example
///
/// ```
/// use sharekit::dict::SharedDict;
///
/// let err = SharedDict::new("counters", 0).unwrap_err();
/// assert!(err.to_string().contains("quota"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}
