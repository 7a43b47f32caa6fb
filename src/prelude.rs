pub use crate::bounded::{BoundedCache, OverflowPolicy};
pub use crate::config::{DictSpec, InstanceSettings};
pub use crate::dict::{SharedDict, Value};
pub use crate::error::{ConfigError, Error, InvariantError, Result};
pub use crate::instance::{InstanceConf, Replica};
pub use crate::pattern::{CaptureSet, MatcherHandle, PatternCache, PatternFlags};
pub use crate::registry::{Activation, LifecycleState, ResourceRegistry, Teardown};
pub use crate::store::{HashedStore, StoreMetrics};
