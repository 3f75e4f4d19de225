//! # Registry Configuration
//!
//! The pool sections from `cistern_core` plus a `[text]` table:
//!
//! ```toml
//! [array]
//! max_per_bucket = 16
//!
//! [object]
//! max_idle = 64
//!
//! [text]
//! initial_capacity = 256
//! max_retained_capacity = 4096
//! ```

use std::path::Path;

use cistern_core::{CisternError, PoolConfig};
use serde::{Deserialize, Serialize};

use crate::error::RegistryResult;

/// Pooled text builder settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Capacity of freshly created builders.
    pub initial_capacity: usize,
    /// Builders that grew past this are shrunk back to `initial_capacity`
    /// when returned.
    pub max_retained_capacity: usize,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 256,
            max_retained_capacity: 4096,
        }
    }
}

/// Everything a [`PoolRegistry`](crate::PoolRegistry) needs at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Array and object pool settings.
    #[serde(flatten)]
    pub pools: PoolConfig,
    /// Text builder settings.
    pub text: TextConfig,
}

impl RegistryConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an invalid-config error on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> RegistryResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| CisternError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a config-io error if the file cannot be read, otherwise the
    /// same errors as [`RegistryConfig::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| CisternError::ConfigIo(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Validates the pool sections and the text limits.
    ///
    /// # Errors
    ///
    /// Returns an invalid-config error naming the first bad value.
    pub fn validate(&self) -> RegistryResult<()> {
        self.pools.validate()?;
        if self.text.max_retained_capacity < self.text.initial_capacity {
            return Err(CisternError::InvalidConfig(format!(
                "text.max_retained_capacity ({}) is below text.initial_capacity ({})",
                self.text.max_retained_capacity, self.text.initial_capacity
            ))
            .into());
        }
        Ok(())
    }
}
