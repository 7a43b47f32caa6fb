//! Per-replica plugin instance handles.
//!
//! The host creates one [`InstanceConf`] per worker thread for the same
//! logical plugin instance. Exactly one of them is flagged first and exactly
//! one last (the same one when there is a single worker). The flags drive the
//! registry lifecycle:
//!
//! | Replica          | `attach`                            | `detach`           |
//! |------------------|-------------------------------------|--------------------|
//! | first            | activates the registry (+1 holder)  | -                  |
//! | last             | -                                   | releases a holder  |
//! | neither          | checks declared names are present   | nothing            |
//!
//! The registry is torn down once every instance sharing it has released
//! its holder.
//!
//! The host must attach the first replica before the others and detach the
//! last replica after the others; ordering among unflagged replicas does not
//! matter.
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use sharekit::config::InstanceSettings;
//! use sharekit::instance::Replica;
//! use sharekit::registry::{LifecycleState, ResourceRegistry};
//!
//! let registry = Arc::new(ResourceRegistry::new());
//! let mut confs = InstanceSettings::default().with_dict("hits", 4096).replicas(2);
//! let second = confs.pop().unwrap();
//! let first = confs.pop().unwrap();
//!
//! let a = Replica::attach(first, Arc::clone(&registry)).unwrap();
//! let b = Replica::attach(second, Arc::clone(&registry)).unwrap();
//! a.dict("hits").unwrap().increment("GET", 1).unwrap();
//! assert_eq!(b.dict("hits").unwrap().increment("GET", 1).unwrap(), 2);
//!
//! a.detach().unwrap();
//! assert_eq!(registry.state(), LifecycleState::Active);
//! b.detach().unwrap();
//! assert_eq!(registry.state(), LifecycleState::TornDown);
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::config::{DictSpec, InstanceSettings};
use crate::dict::SharedDict;
use crate::error::{Error, Result};
use crate::pattern::PatternCache;
use crate::registry::ResourceRegistry;

/// One replica's view of the instance configuration.
#[derive(Debug, Clone)]
pub struct InstanceConf {
    settings: Arc<InstanceSettings>,
    index: usize,
    is_first: bool,
    is_last: bool,
}

impl InstanceConf {
    pub fn new(settings: Arc<InstanceSettings>, index: usize, is_first: bool, is_last: bool) -> Self {
        Self {
            settings,
            index,
            is_first,
            is_last,
        }
    }

    /// A lone replica, flagged both first and last.
    pub fn single(settings: InstanceSettings) -> Self {
        Self::new(Arc::new(settings), 0, true, true)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_first(&self) -> bool {
        self.is_first
    }

    pub fn is_last(&self) -> bool {
        self.is_last
    }

    pub fn settings(&self) -> &InstanceSettings {
        &self.settings
    }

    pub fn dicts(&self) -> &[DictSpec] {
        &self.settings.dicts
    }
}

/// A replica attached to the shared registry.
#[derive(Debug)]
pub struct Replica {
    conf: InstanceConf,
    registry: Arc<ResourceRegistry>,
}

impl Replica {
    /// Attaches `conf` to `registry`, activating it if `conf` is first.
    ///
    /// Other replicas only verify that each declared dictionary exists with
    /// the declared quota.
    pub fn attach(conf: InstanceConf, registry: Arc<ResourceRegistry>) -> Result<Self> {
        if conf.is_first() {
            conf.settings().validate()?;
            let outcome = registry.activate(conf.settings())?;
            debug!(replica = conf.index(), ?outcome, "first replica attached");
        } else {
            for spec in conf.dicts() {
                let dict = registry.dict(&spec.name)?;
                if dict.quota() != spec.quota {
                    return Err(Error::ConfigConflict {
                        name: spec.name.clone(),
                        registered: dict.quota(),
                        declared: spec.quota,
                    });
                }
            }
            debug!(replica = conf.index(), "replica attached");
        }
        Ok(Self { conf, registry })
    }

    pub fn conf(&self) -> &InstanceConf {
        &self.conf
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn dict(&self, name: &str) -> Result<Arc<SharedDict>> {
        self.registry.dict(name)
    }

    pub fn patterns(&self) -> Result<Arc<PatternCache>> {
        self.registry.patterns()
    }

    /// Detaches; the last replica releases this instance's registry holder.
    pub fn detach(self) -> Result<()> {
        if self.conf.is_last() {
            let outcome = self.registry.teardown()?;
            debug!(replica = self.conf.index(), ?outcome, "instance released registry");
        }
        debug!(replica = self.conf.index(), "replica detached");
        Ok(())
    }
}
