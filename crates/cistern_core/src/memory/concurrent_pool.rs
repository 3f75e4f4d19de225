//! # Concurrent Object Pool
//!
//! Same contract as [`ObjectPool`](super::ObjectPool), safe for
//! uncoordinated `get`/return from many threads.
//!
//! ## Thread Safety
//!
//! The free list sits behind a `parking_lot::Mutex` held only for a push or
//! pop. The factory and reset hook run outside the lock.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::object_pool::PoolStats;
use crate::config::ObjectPoolConfig;
use crate::error::{CisternError, CisternResult};

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;
type ResetHook<T> = Box<dyn Fn(&mut T) + Send + Sync>;

struct ConcurrentShared<T> {
    free: Mutex<Vec<T>>,
    factory: Factory<T>,
    reset: Option<ResetHook<T>>,
    max_idle: Option<usize>,
    created: AtomicU64,
    reused: AtomicU64,
    returned: AtomicU64,
    discarded: AtomicU64,
}

impl<T> ConcurrentShared<T> {
    fn take(&self) -> T {
        let idle = self.free.lock().pop();
        if let Some(value) = idle {
            self.reused.fetch_add(1, Ordering::Relaxed);
            value
        } else {
            self.created.fetch_add(1, Ordering::Relaxed);
            (self.factory)()
        }
    }

    fn give_back(&self, mut value: T) {
        if let Some(reset) = &self.reset {
            reset(&mut value);
        }

        {
            let mut free = self.free.lock();
            if !self.max_idle.is_some_and(|max| free.len() >= max) {
                free.push(value);
                self.returned.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        // Dropped outside the lock.
        drop(value);
        self.discarded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(max_idle = ?self.max_idle, "concurrent pool full, discarding instance");
    }
}

/// A thread-safe object pool.
///
/// Cloning yields another handle to the same pool. Wrappers may be sent to
/// other threads and returned from there.
///
/// # Example
///
/// ```rust
/// use cistern_core::ConcurrentObjectPool;
/// use std::thread;
///
/// let pool = ConcurrentObjectPool::builder(|| Vec::<u8>::with_capacity(64))
///     .reset(Vec::clear)
///     .build();
///
/// let worker = {
///     let pool = pool.clone();
///     thread::spawn(move || {
///         let mut scratch = pool.get();
///         scratch.get_mut().extend_from_slice(b"payload");
///         scratch.get().len()
///     })
/// };
///
/// assert_eq!(worker.join().unwrap(), 7);
/// assert_eq!(pool.idle_count(), 1);
/// ```
pub struct ConcurrentObjectPool<T> {
    shared: Arc<ConcurrentShared<T>>,
}

impl<T: Send> ConcurrentObjectPool<T> {
    /// Creates a pool that builds new instances with `factory`.
    #[must_use]
    pub fn new(factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self::builder(factory).build()
    }

    /// Starts building a pool with a reset hook, idle cap or prewarm count.
    pub fn builder(
        factory: impl Fn() -> T + Send + Sync + 'static,
    ) -> ConcurrentObjectPoolBuilder<T> {
        ConcurrentObjectPoolBuilder {
            factory: Box::new(factory),
            reset: None,
            max_idle: None,
            prewarm: 0,
        }
    }
}

impl<T> ConcurrentObjectPool<T> {
    /// Checks out an instance, reusing an idle one when available.
    #[must_use]
    pub fn get(&self) -> ConcurrentPoolWrapper<T> {
        ConcurrentPoolWrapper {
            value: Some(self.shared.take()),
            owner: Arc::downgrade(&self.shared),
        }
    }

    /// Returns a wrapper through this pool.
    ///
    /// # Errors
    ///
    /// Returns [`CisternError::ForeignPool`] if the wrapper belongs to another
    /// pool. The rejected wrapper still goes back to its own pool.
    pub fn put(&self, wrapper: ConcurrentPoolWrapper<T>) -> CisternResult<()> {
        if !self.owns(&wrapper) {
            tracing::warn!("rejected wrapper returned to a foreign concurrent pool");
            return Err(CisternError::ForeignPool);
        }
        wrapper.return_to_pool();
        Ok(())
    }

    /// Whether `wrapper` was handed out by this pool.
    #[inline]
    #[must_use]
    pub fn owns(&self, wrapper: &ConcurrentPoolWrapper<T>) -> bool {
        std::ptr::eq(wrapper.owner.as_ptr(), Arc::as_ptr(&self.shared))
    }

    /// Number of idle instances on the free list.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.shared.free.lock().len()
    }

    /// Usage counters. Relaxed snapshot; fields may be mutually inconsistent
    /// while other threads are active.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.shared.created.load(Ordering::Relaxed),
            reused: self.shared.reused.load(Ordering::Relaxed),
            returned: self.shared.returned.load(Ordering::Relaxed),
            discarded: self.shared.discarded.load(Ordering::Relaxed),
        }
    }

    /// Drops every idle instance. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped: Vec<T> = std::mem::take(&mut *self.shared.free.lock());
        tracing::debug!(dropped = dropped.len(), "concurrent pool cleared");
        dropped.len()
    }
}

impl<T> Clone for ConcurrentObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for ConcurrentObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentObjectPool")
            .field("idle", &self.idle_count())
            .field("max_idle", &self.shared.max_idle)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Builder for [`ConcurrentObjectPool`].
pub struct ConcurrentObjectPoolBuilder<T> {
    factory: Factory<T>,
    reset: Option<ResetHook<T>>,
    max_idle: Option<usize>,
    prewarm: usize,
}

impl<T: Send> ConcurrentObjectPoolBuilder<T> {
    /// Hook run on every instance as it goes back on the free list.
    #[must_use]
    pub fn reset(mut self, hook: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.reset = Some(Box::new(hook));
        self
    }

    /// Caps the free list. Instances returned to a full pool are dropped.
    #[must_use]
    pub fn max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    /// Number of instances to construct up front.
    #[must_use]
    pub fn prewarm(mut self, count: usize) -> Self {
        self.prewarm = count;
        self
    }

    /// Applies the idle cap and prewarm count from a config section.
    #[must_use]
    pub fn config(mut self, config: &ObjectPoolConfig) -> Self {
        self.max_idle = config.max_idle;
        self.prewarm = config.prewarm;
        self
    }

    /// Builds the pool, running the factory `prewarm` times.
    #[must_use]
    pub fn build(self) -> ConcurrentObjectPool<T> {
        let prewarm = match self.max_idle {
            Some(max) => self.prewarm.min(max),
            None => self.prewarm,
        };
        let free: Vec<T> = (0..prewarm).map(|_| (self.factory)()).collect();

        ConcurrentObjectPool {
            shared: Arc::new(ConcurrentShared {
                free: Mutex::new(free),
                factory: self.factory,
                reset: self.reset,
                max_idle: self.max_idle,
                created: AtomicU64::new(prewarm as u64),
                reused: AtomicU64::new(0),
                returned: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
            }),
        }
    }
}

impl<T> fmt::Debug for ConcurrentObjectPoolBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentObjectPoolBuilder")
            .field("max_idle", &self.max_idle)
            .field("prewarm", &self.prewarm)
            .field("has_reset", &self.reset.is_some())
            .finish_non_exhaustive()
    }
}

/// A checked-out instance from a [`ConcurrentObjectPool`].
///
/// Returns itself to its pool on [`return_to_pool`](Self::return_to_pool) or
/// drop, from whichever thread currently owns it.
pub struct ConcurrentPoolWrapper<T> {
    /// Always `Some` until the wrapper is consumed.
    value: Option<T>,
    owner: Weak<ConcurrentShared<T>>,
}

impl<T> ConcurrentPoolWrapper<T> {
    /// Shared access to the payload.
    #[inline]
    #[must_use]
    pub fn get(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => unreachable!("payload taken from a live wrapper"),
        }
    }

    /// Exclusive access to the payload.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("payload taken from a live wrapper"),
        }
    }

    /// The pool this wrapper returns to, if it still exists.
    #[must_use]
    pub fn pool(&self) -> Option<ConcurrentObjectPool<T>> {
        self.owner
            .upgrade()
            .map(|shared| ConcurrentObjectPool { shared })
    }

    /// Hands the wrapper back to its owning pool.
    ///
    /// If the pool has been dropped the payload is dropped instead.
    #[inline]
    pub fn return_to_pool(self) {
        drop(self);
    }

    /// Detaches the payload. It will never go back to the pool.
    #[must_use]
    pub fn into_inner(mut self) -> T {
        match self.value.take() {
            Some(value) => value,
            None => unreachable!("payload taken from a live wrapper"),
        }
    }
}

impl<T> Drop for ConcurrentPoolWrapper<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            if let Some(owner) = self.owner.upgrade() {
                owner.give_back(value);
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ConcurrentPoolWrapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentPoolWrapper")
            .field("value", &self.value)
            .field("pool_alive", &(self.owner.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_reuse_same_instance() {
        let pool = ConcurrentObjectPool::new(|| Box::new(0_u64));

        let first = pool.get();
        let addr: *const u64 = &**first.get();
        first.return_to_pool();

        let second = pool.get();
        assert!(std::ptr::eq(&**second.get(), addr));
        assert_eq!(pool.stats().created, 1);
        assert_eq!(pool.stats().reused, 1);
    }

    #[test]
    fn test_foreign_pool_rejected() {
        let home = ConcurrentObjectPool::new(String::new);
        let other = ConcurrentObjectPool::new(String::new);

        let wrapper = home.get();
        assert_eq!(other.put(wrapper), Err(CisternError::ForeignPool));
        assert_eq!(home.idle_count(), 1);
        assert_eq!(other.idle_count(), 0);
    }

    #[test]
    fn test_return_from_other_thread() {
        let pool = ConcurrentObjectPool::builder(String::new)
            .reset(String::clear)
            .build();

        let mut wrapper = pool.get();
        wrapper.get_mut().push_str("dirty");

        thread::spawn(move || wrapper.return_to_pool())
            .join()
            .unwrap();

        assert_eq!(pool.idle_count(), 1);
        assert!(pool.get().get().is_empty());
    }

    #[test]
    fn test_concurrent_get_return() {
        let pool = ConcurrentObjectPool::builder(|| vec![0_u8; 16])
            .max_idle(64)
            .build();
        let threads = 8;
        let iterations = 500;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for i in 0..iterations {
                        let mut buf = pool.get();
                        buf.get_mut()[0] = (i % 256) as u8;
                        buf.return_to_pool();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.created + stats.reused, (threads * iterations) as u64);
        assert_eq!(stats.returned + stats.discarded, (threads * iterations) as u64);
        assert!(pool.idle_count() <= threads);
    }

    #[test]
    fn test_max_idle_discards_excess() {
        let pool = ConcurrentObjectPool::builder(|| 1_u32).max_idle(2).build();

        let held: Vec<_> = (0..3).map(|_| pool.get()).collect();
        drop(held);

        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.stats().discarded, 1);
    }

    #[test]
    fn test_wrapper_outlives_pool() {
        let pool = ConcurrentObjectPool::new(|| 3_i8);
        let wrapper = pool.get();
        drop(pool);

        assert!(wrapper.pool().is_none());
        assert_eq!(wrapper.into_inner(), 3);
    }
}
