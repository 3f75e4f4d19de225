//! # Shared Array Cache
//!
//! Secondary tier behind a [`ConcurrentArrayPool`](super::ConcurrentArrayPool).
//! Buffers a pool cannot retain are offered here, and a pool whose bucket is
//! empty asks here before allocating. Several pools may share one cache.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;

/// A process-wide buffer cache that pools can overflow into.
pub trait SharedArrayCache<T>: Send + Sync {
    /// Takes an idle buffer of exactly `capacity` elements, if one is cached.
    fn take(&self, capacity: usize) -> Option<Box<[T]>>;

    /// Offers a buffer to the cache. Returns `false` if it was not kept.
    fn offer(&self, buffer: Box<[T]>) -> bool;
}

/// A [`SharedArrayCache`] holding at most `per_capacity` buffers per length.
pub struct BoundedSharedCache<T> {
    per_capacity: usize,
    stacks: Mutex<HashMap<usize, Vec<Box<[T]>>>>,
}

impl<T> BoundedSharedCache<T> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(per_capacity: usize) -> Self {
        Self {
            per_capacity,
            stacks: Mutex::new(HashMap::new()),
        }
    }

    /// Idle buffers cached for `capacity`.
    #[must_use]
    pub fn idle_count(&self, capacity: usize) -> usize {
        self.stacks.lock().get(&capacity).map_or(0, Vec::len)
    }

    /// Drops everything. Returns how many buffers were dropped.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = self.stacks.lock().drain().collect();
        drained.iter().map(|(_, stack)| stack.len()).sum()
    }
}

impl<T: Send> SharedArrayCache<T> for BoundedSharedCache<T> {
    fn take(&self, capacity: usize) -> Option<Box<[T]>> {
        self.stacks.lock().get_mut(&capacity)?.pop()
    }

    fn offer(&self, buffer: Box<[T]>) -> bool {
        let mut stacks = self.stacks.lock();
        let stack = stacks.entry(buffer.len()).or_default();
        if stack.len() >= self.per_capacity {
            return false;
        }
        stack.push(buffer);
        true
    }
}

impl<T> fmt::Debug for BoundedSharedCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stacks = self.stacks.lock();
        f.debug_struct("BoundedSharedCache")
            .field("per_capacity", &self.per_capacity)
            .field("capacities", &stacks.len())
            .field("idle", &stacks.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}
