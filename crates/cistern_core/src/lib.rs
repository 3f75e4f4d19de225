//! # Cistern Core
//!
//! Pooling and shared-collection primitives for hot paths that must not
//! allocate per call:
//! - Object pools whose wrappers return themselves when dropped
//! - Capacity-bucketed array pools with a bounded retention policy
//! - Pool slices over rented buffers that are larger than needed
//! - A concurrent observable collection with context-aware notifications
//!
//! ## Architecture Rules
//!
//! 1. **Single ownership between acquire and release** - wrappers and slices
//!    consume themselves on release, so nothing aliases a returned instance
//! 2. **Bounded retention** - pools keep at most a configured number of idle
//!    buffers per capacity class and drop the rest
//! 3. **No background threads** - work happens on the caller, or on the thread
//!    that pumps a dispatcher
//!
//! ## Example
//!
//! ```rust
//! use cistern_core::{ConcurrentArrayPool, ObjectPool};
//!
//! let pool = ObjectPool::new(Vec::<u8>::new);
//! let mut scratch = pool.get();
//! scratch.get_mut().push(1);
//! scratch.return_to_pool();
//! assert_eq!(pool.idle_count(), 1);
//!
//! let buffers: ConcurrentArrayPool<f32> = ConcurrentArrayPool::new();
//! let samples = buffers.rent_slice(300)?;
//! assert_eq!(samples.len(), 300);
//! assert_eq!(samples.capacity(), 512);
//! # Ok::<(), cistern_core::CisternError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod memory;
pub mod sync;

pub use config::{ArrayPoolConfig, ObjectPoolConfig, PoolConfig};
pub use error::{CisternError, CisternResult};
pub use memory::{
    clear_buffer, ArrayPool, ArrayPoolStats, ArraySource, BoundedSharedCache, ConcurrentArrayPool,
    ConcurrentObjectPool, ConcurrentPoolWrapper, ObjectPool, PoolSlice, PoolStats, PoolWrapper,
    ReleaseOutcome, SharedArrayCache,
};
pub use sync::{
    CollectionChange, Dispatcher, ExecutionContext, NotifySink, ObservableCollection,
    QueueDispatcher, SubscriptionId,
};
