//! # Resource Registry
//!
//! Process-wide owner of every shared dictionary and of the single pattern
//! cache. Per-thread replicas never own these resources; they look them up by
//! name and hold `Arc` clones for the duration of a call.
//!
//! ## Lifecycle
//!
//! ```text
//!   Uninitialized ──activate()──► Active ──teardown()──► TornDown
//!         │                        │ ▲  │ ▲   last holder    (terminal)
//!         │                        └─┘  └─┘
//!         │              activate(): +1 holder,   teardown(): -1 holder
//!         │              new names only           while others remain
//!         └──────────teardown()─────────────────────────────►
//! ```
//!
//! - `activate` is driven by the replica flagged first. From `Uninitialized`
//!   it builds the pattern cache and registers every declared dictionary.
//!   While `Active` it only adds names that are not registered yet.
//! - A declaration that reuses a registered name with a different quota is a
//!   `ConfigConflict`; the call then registers nothing at all.
//! - Every successful `activate` adds a holder, so several instances can
//!   share one registry.
//! - `teardown` is driven by the replica flagged last and releases one
//!   holder. Only the release of the final holder retires the entries, each
//!   under its own guard, so callers already inside a dictionary operation
//!   finish before the storage is released, and anyone still holding an
//!   `Arc` afterwards gets `RegistryUnavailable`.
//!
//! ## Locking
//!
//! The name table sits behind a `parking_lot::RwLock` that is only held for
//! lookups and transitions. Dictionary and pattern operations run under the
//! entry's own guard, never under the registry lock, so different
//! dictionaries proceed in parallel. Lock order is always registry, then
//! entry.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::config::{DictSpec, InstanceSettings};
use crate::dict::SharedDict;
use crate::error::{Error, Result};
use crate::pattern::PatternCache;

/// Where a registry is in its single-init / single-teardown lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Uninitialized,
    Active,
    TornDown,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::Uninitialized => "not yet active",
            LifecycleState::Active => "active",
            LifecycleState::TornDown => "torn down",
        })
    }
}

/// Outcome of a successful [`ResourceRegistry::activate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// This call performed the `Uninitialized -> Active` transition.
    Activated,
    /// The registry was already active; only new names were registered.
    AlreadyActive,
}

impl Activation {
    /// Whether this call performed the transition.
    pub fn is_transition(self) -> bool {
        self == Activation::Activated
    }
}

/// Outcome of a successful [`ResourceRegistry::teardown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// One holder released; `remaining` instances still use the registry.
    Released { remaining: usize },
    /// This call performed the transition into `TornDown`.
    TornDown,
}

#[derive(Debug)]
struct RegistryInner {
    state: LifecycleState,
    holders: usize,
    dicts: FxHashMap<String, Arc<SharedDict>>,
    patterns: Option<Arc<PatternCache>>,
}

/// Name-addressed owner of all shared resources of a plugin instance.
#[derive(Debug)]
pub struct ResourceRegistry {
    inner: RwLock<RegistryInner>,
    activations: AtomicU64,
    teardowns: AtomicU64,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                state: LifecycleState::Uninitialized,
                holders: 0,
                dicts: FxHashMap::default(),
                patterns: None,
            }),
            activations: AtomicU64::new(0),
            teardowns: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.read().state
    }

    /// Instances currently holding the registry active.
    pub fn holders(&self) -> usize {
        self.inner.read().holders
    }

    /// Number of `Uninitialized -> Active` transitions performed (0 or 1).
    pub fn activations(&self) -> u64 {
        self.activations.load(Ordering::Relaxed)
    }

    /// Number of transitions into `TornDown` performed (0 or 1).
    pub fn teardowns(&self) -> u64 {
        self.teardowns.load(Ordering::Relaxed)
    }

    /// Registers the declared dictionaries, activating the registry if needed.
    ///
    /// All declarations are validated before anything is registered: a
    /// quota conflict, an invalid name or a zero quota leaves the registry
    /// exactly as it was.
    pub fn activate(&self, settings: &InstanceSettings) -> Result<Activation> {
        let mut inner = self.inner.write();
        if inner.state == LifecycleState::TornDown {
            return Err(Error::RegistryUnavailable {
                state: LifecycleState::TornDown,
            });
        }

        let mut pending: Vec<&DictSpec> = Vec::new();
        for spec in &settings.dicts {
            let registered = inner
                .dicts
                .get(&spec.name)
                .map(|dict| dict.quota())
                .or_else(|| {
                    pending
                        .iter()
                        .find(|p| p.name == spec.name)
                        .map(|p| p.quota)
                });
            match registered {
                Some(quota) if quota != spec.quota => {
                    warn!(
                        name = %spec.name,
                        registered = quota,
                        declared = spec.quota,
                        "conflicting shared dictionary declaration"
                    );
                    return Err(Error::ConfigConflict {
                        name: spec.name.clone(),
                        registered: quota,
                        declared: spec.quota,
                    });
                },
                Some(_) => {},
                None => pending.push(spec),
            }
        }

        let built = pending
            .iter()
            .map(|spec| SharedDict::new(spec.name.clone(), spec.quota).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        let activation = match inner.state {
            LifecycleState::Uninitialized => {
                let patterns = PatternCache::new(settings.pattern_capacity)?;
                inner.patterns = Some(Arc::new(patterns));
                inner.state = LifecycleState::Active;
                self.activations.fetch_add(1, Ordering::Relaxed);
                Activation::Activated
            },
            _ => Activation::AlreadyActive,
        };

        for dict in built {
            debug!(name = dict.name(), quota = dict.quota(), "registered shared dictionary");
            inner.dicts.insert(dict.name().to_owned(), dict);
        }
        inner.holders += 1;

        if activation == Activation::Activated {
            info!(
                dictionaries = inner.dicts.len(),
                pattern_capacity = settings.pattern_capacity,
                "resource registry active"
            );
        }
        Ok(activation)
    }

    /// Releases one holder. When none remain, retires and drops every
    /// resource and moves to `TornDown`.
    pub fn teardown(&self) -> Result<Teardown> {
        let mut inner = self.inner.write();
        if inner.state == LifecycleState::TornDown {
            return Err(Error::RegistryUnavailable {
                state: LifecycleState::TornDown,
            });
        }
        inner.holders = inner.holders.saturating_sub(1);
        if inner.holders > 0 {
            debug!(remaining = inner.holders, "resource registry holder released");
            return Ok(Teardown::Released {
                remaining: inner.holders,
            });
        }

        let dicts = std::mem::take(&mut inner.dicts);
        for dict in dicts.values() {
            dict.retire();
        }
        if let Some(patterns) = inner.patterns.take() {
            patterns.retire();
        }
        inner.state = LifecycleState::TornDown;
        self.teardowns.fetch_add(1, Ordering::Relaxed);
        info!(dictionaries = dicts.len(), "resource registry torn down");
        Ok(Teardown::TornDown)
    }

    /// Looks up a dictionary by name.
    pub fn dict(&self, name: &str) -> Result<Arc<SharedDict>> {
        let inner = self.active()?;
        inner.dicts.get(name).cloned().ok_or_else(|| {
            warn!(name, "lookup of unregistered shared dictionary");
            Error::not_found(name)
        })
    }

    pub fn patterns(&self) -> Result<Arc<PatternCache>> {
        let inner = self.active()?;
        inner
            .patterns
            .clone()
            .ok_or_else(|| Error::not_found("pattern cache"))
    }

    /// Registered dictionary names, sorted.
    pub fn dict_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().dicts.keys().cloned().collect();
        names.sort();
        names
    }

    fn active(&self) -> Result<parking_lot::RwLockReadGuard<'_, RegistryInner>> {
        let inner = self.inner.read();
        if inner.state != LifecycleState::Active {
            return Err(Error::RegistryUnavailable { state: inner.state });
        }
        Ok(inner)
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
