//! # Memory Pools
//!
//! Reusable objects and buffers for code that would otherwise allocate on
//! every call.
//!
//! ## Ownership
//!
//! ```text
//!   pool ──get()/rent()──> caller (exclusive owner)
//!     ^                        │
//!     └──── return / drop ─────┘
//! ```
//!
//! Between acquisition and release the caller owns the instance outright;
//! after release it must not keep an alias. Wrappers and slices enforce this
//! by consuming themselves on release.

mod array_pool;
mod bucket;
mod concurrent_pool;
mod object_pool;
mod shared_cache;
mod slice;

pub use array_pool::{
    clear_buffer, ArrayPool, ArrayPoolStats, ArraySource, ConcurrentArrayPool, ReleaseOutcome,
};
pub use concurrent_pool::{ConcurrentObjectPool, ConcurrentObjectPoolBuilder, ConcurrentPoolWrapper};
pub use object_pool::{ObjectPool, ObjectPoolBuilder, PoolStats, PoolWrapper};
pub use shared_cache::{BoundedSharedCache, SharedArrayCache};
pub use slice::PoolSlice;
