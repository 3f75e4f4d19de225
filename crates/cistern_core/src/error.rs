//! # Cistern Error Types
//!
//! All errors that can occur in the pooling and collection layer.
//!
//! Every variant here is either a caller contract violation surfaced at the
//! call site or a configuration problem found at startup. Capacity pressure
//! is never an error: a full bucket silently discards the excess buffer.

use thiserror::Error;

/// Errors that can occur in the pooling and collection layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CisternError {
    /// Asked an array pool for a zero-length buffer.
    #[error("invalid rent length: {0}")]
    InvalidLength(usize),

    /// A pool slice was built with a logical size larger than its buffer.
    #[error("slice size {size} exceeds buffer capacity {capacity}")]
    SizeExceedsCapacity {
        /// Requested logical size.
        size: usize,
        /// Actual buffer capacity.
        capacity: usize,
    },

    /// A sub-slice request reached past the logical size of a pool slice.
    #[error("slice range {start}..{start}+{len} out of bounds for logical size {size}")]
    SliceOutOfBounds {
        /// Start of the requested range.
        start: usize,
        /// Length of the requested range.
        len: usize,
        /// Logical size of the slice.
        size: usize,
    },

    /// An index-based collection operation used an index past the end.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Collection length at the time of the call.
        len: usize,
    },

    /// A destination buffer was too small for a copy.
    #[error("destination too small: need {required} slots from offset {offset}, have {available}")]
    DestinationTooSmall {
        /// Elements to copy.
        required: usize,
        /// Offset into the destination.
        offset: usize,
        /// Destination length.
        available: usize,
    },

    /// A wrapper was handed to a pool that did not create it.
    #[error("wrapper returned to a pool that does not own it")]
    ForeignPool,

    /// Invalid configuration values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    ConfigIo(String),
}

/// Result type for pool and collection operations.
pub type CisternResult<T> = Result<T, CisternError>;
