//! Registry errors.

use cistern_core::CisternError;
use thiserror::Error;

/// Errors raised by [`PoolRegistry`](crate::PoolRegistry).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A core pool or configuration error.
    #[error(transparent)]
    Core(#[from] CisternError),

    /// An object pool for this payload type is already registered.
    #[error("object pool already registered for {0}")]
    AlreadyRegistered(&'static str),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
