//! Instance configuration.
//!
//! [`InstanceSettings`] describes one logical plugin instance: the script it
//! runs, its configuration variables, the shared dictionaries it declares and
//! the size of the compiled-pattern cache. It can be built in code or loaded
//! from TOML:
//!
//! ```rust
//! use sharekit::config::InstanceSettings;
//!
//! let settings = InstanceSettings::from_toml_str(r#"
//!     script = "/etc/proxy/rewrite.lua"
//!     pattern_capacity = 32
//!
//!     [[dict]]
//!     name = "counters"
//!     quota = 1048576
//!
//!     [vars]
//!     region = "eu-west"
//! "#).unwrap();
//!
//! assert_eq!(settings.dicts[0].name, "counters");
//! assert_eq!(settings.pattern_capacity, 32);
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dict::validate_name;
use crate::error::ConfigError;
use crate::instance::InstanceConf;
use crate::pattern::DEFAULT_MAX_ENTRIES;

/// Most shared dictionaries one instance may declare.
pub const MAX_DICT_COUNT: usize = 32;

/// Most configuration variables one instance may carry.
pub const MAX_CONFIG_VARS: usize = 256;

/// Longest accepted script path, in bytes.
pub const MAX_SCRIPT_PATH_LEN: usize = 1024;

/// A shared dictionary declaration: name plus byte quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DictSpec {
    pub name: String,
    pub quota: u64,
}

/// Settings shared by every replica of one logical plugin instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstanceSettings {
    /// Script the scripting engine loads; opaque to this crate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<PathBuf>,
    /// Resident compiled patterns before LRU eviction starts.
    pub pattern_capacity: usize,
    #[serde(rename = "dict")]
    pub dicts: Vec<DictSpec>,
    /// Free-form variables handed to the script.
    pub vars: BTreeMap<String, String>,
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self {
            script: None,
            pattern_capacity: DEFAULT_MAX_ENTRIES,
            dicts: Vec::new(),
            vars: BTreeMap::new(),
        }
    }
}

impl InstanceSettings {
    /// Parses and validates TOML settings.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(input)
            .map_err(|err| ConfigError::new(format!("invalid instance config: {err}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Renders the settings as TOML that [`from_toml_str`](Self::from_toml_str)
    /// reads back unchanged.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self)
            .map_err(|err| ConfigError::new(format!("cannot render instance config: {err}")))
    }

    pub fn with_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn with_pattern_capacity(mut self, capacity: usize) -> Self {
        self.pattern_capacity = capacity;
        self
    }

    pub fn with_dict(mut self, name: impl Into<String>, quota: u64) -> Self {
        self.dicts.push(DictSpec {
            name: name.into(),
            quota,
        });
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Checks every limit an instance must respect.
    ///
    /// Duplicate dictionary names are not checked here; the registry decides
    /// whether they conflict.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(script) = &self.script {
            if script.as_os_str().len() > MAX_SCRIPT_PATH_LEN {
                return Err(ConfigError::new(format!(
                    "script path is longer than {MAX_SCRIPT_PATH_LEN} bytes"
                )));
            }
        }
        if self.vars.len() > MAX_CONFIG_VARS {
            return Err(ConfigError::new(format!(
                "{} config vars given, at most {MAX_CONFIG_VARS} allowed",
                self.vars.len()
            )));
        }
        if self.pattern_capacity == 0 {
            return Err(ConfigError::new("pattern_capacity must be > 0"));
        }
        if self.dicts.len() > MAX_DICT_COUNT {
            return Err(ConfigError::new(format!(
                "{} shared dictionaries declared, at most {MAX_DICT_COUNT} allowed",
                self.dicts.len()
            )));
        }
        for spec in &self.dicts {
            validate_name(&spec.name)?;
            if spec.quota == 0 {
                return Err(ConfigError::new(format!(
                    "dictionary `{}`: quota must be > 0",
                    spec.name
                )));
            }
        }
        Ok(())
    }

    /// Builds `count` replica configurations: the first is flagged first,
    /// the last is flagged last (the same one when `count == 1`).
    pub fn replicas(self, count: usize) -> Vec<InstanceConf> {
        let settings = Arc::new(self);
        (0..count)
            .map(|index| {
                InstanceConf::new(
                    Arc::clone(&settings),
                    index,
                    index == 0,
                    index + 1 == count,
                )
            })
            .collect()
    }
}
