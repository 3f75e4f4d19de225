//! # Pool Configuration
//!
//! Retention limits and bucket geometry, loaded once at startup from TOML.
//!
//! ```toml
//! [array]
//! min_bucket_length = 16
//! max_array_length = 1048576
//! max_per_bucket = 32
//! clear_on_release = false
//! shared_tier = true
//! shared_tier_per_capacity = 8
//!
//! [object]
//! prewarm = 0
//! max_idle = 64
//! ```
//!
//! Every key is optional; omitted keys take the defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CisternError, CisternResult};

/// Bucket geometry and retention policy for array pools.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayPoolConfig {
    /// Smallest capacity class. Must be a power of two.
    pub min_bucket_length: usize,
    /// Largest capacity class. Larger rents are allocated exactly and never retained.
    pub max_array_length: usize,
    /// Default cap on idle buffers per bucket.
    pub max_per_bucket: usize,
    /// Whether pool slices clear their buffer before releasing it by default.
    pub clear_on_release: bool,
    /// Whether the concurrent pool gets a shared overflow tier.
    pub shared_tier: bool,
    /// Idle buffers the shared tier keeps per capacity.
    pub shared_tier_per_capacity: usize,
}

impl Default for ArrayPoolConfig {
    fn default() -> Self {
        Self {
            min_bucket_length: 16,
            max_array_length: 1024 * 1024,
            max_per_bucket: 32,
            clear_on_release: false,
            shared_tier: false,
            shared_tier_per_capacity: 8,
        }
    }
}

impl ArrayPoolConfig {
    /// Checks bucket geometry.
    ///
    /// # Errors
    ///
    /// Returns [`CisternError::InvalidConfig`] if the minimum class is not a
    /// power of two, the maximum is below the minimum, or the per-bucket cap
    /// is zero.
    pub fn validate(&self) -> CisternResult<()> {
        if !self.min_bucket_length.is_power_of_two() {
            return Err(CisternError::InvalidConfig(format!(
                "min_bucket_length must be a power of two, got {}",
                self.min_bucket_length
            )));
        }
        if self.max_array_length < self.min_bucket_length {
            return Err(CisternError::InvalidConfig(format!(
                "max_array_length {} is below min_bucket_length {}",
                self.max_array_length, self.min_bucket_length
            )));
        }
        if self.max_per_bucket == 0 {
            return Err(CisternError::InvalidConfig(
                "max_per_bucket must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Free-list policy for object pools.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectPoolConfig {
    /// Instances constructed up front.
    pub prewarm: usize,
    /// Cap on idle instances. `None` keeps every returned instance.
    pub max_idle: Option<usize>,
}

/// Complete pool configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Array pool settings.
    pub array: ArrayPoolConfig,
    /// Object pool settings.
    pub object: ObjectPoolConfig,
}

impl PoolConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`CisternError::InvalidConfig`] on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> CisternResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| CisternError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`CisternError::ConfigIo`] if the file cannot be read, otherwise
    /// the same errors as [`PoolConfig::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> CisternResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| CisternError::ConfigIo(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Serializes to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`CisternError::InvalidConfig`] if serialization fails.
    pub fn to_toml_string(&self) -> CisternResult<String> {
        toml::to_string(self).map_err(|e| CisternError::InvalidConfig(e.to_string()))
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// See [`ArrayPoolConfig::validate`].
    pub fn validate(&self) -> CisternResult<()> {
        self.array.validate()
    }
}
