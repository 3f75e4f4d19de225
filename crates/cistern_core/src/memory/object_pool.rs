//! # Object Pool
//!
//! Single-threaded free-list cache of reusable instances.
//!
//! A pool hands out [`PoolWrapper`]s. Each wrapper carries a weak
//! back-reference to the pool that created it, set at construction and never
//! reassigned, so it can return itself. Dropping a wrapper returns it too.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::config::ObjectPoolConfig;
use crate::error::{CisternError, CisternResult};

/// Counters describing how a pool has been used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances built by the factory.
    pub created: u64,
    /// `get()` calls served from the free list.
    pub reused: u64,
    /// Instances placed back on the free list.
    pub returned: u64,
    /// Returned instances dropped because the free list was full.
    pub discarded: u64,
}

type Factory<T> = Box<dyn Fn() -> T>;
type ResetHook<T> = Box<dyn Fn(&mut T)>;

/// State shared between a pool handle and its outstanding wrappers.
struct PoolShared<T> {
    free: RefCell<Vec<T>>,
    factory: Factory<T>,
    reset: Option<ResetHook<T>>,
    max_idle: Option<usize>,
    created: Cell<u64>,
    reused: Cell<u64>,
    returned: Cell<u64>,
    discarded: Cell<u64>,
}

impl<T> PoolShared<T> {
    fn take(&self) -> T {
        // Release the borrow before running the factory.
        let idle = self.free.borrow_mut().pop();
        if let Some(value) = idle {
            bump(&self.reused);
            value
        } else {
            bump(&self.created);
            (self.factory)()
        }
    }

    fn give_back(&self, mut value: T) {
        if let Some(reset) = &self.reset {
            reset(&mut value);
        }

        let mut free = self.free.borrow_mut();
        if self.max_idle.is_some_and(|max| free.len() >= max) {
            drop(free);
            bump(&self.discarded);
            tracing::trace!(max_idle = ?self.max_idle, "object pool full, discarding instance");
            return;
        }

        free.push(value);
        bump(&self.returned);
    }
}

#[inline]
fn bump(counter: &Cell<u64>) {
    counter.set(counter.get().wrapping_add(1));
}

/// A single-threaded object pool.
///
/// The pool is a cheap handle: cloning it yields another handle to the same
/// free list. It is neither `Send` nor `Sync`; use
/// [`ConcurrentObjectPool`](super::ConcurrentObjectPool) for shared access.
///
/// # Example
///
/// ```rust
/// use cistern_core::ObjectPool;
///
/// let pool = ObjectPool::builder(String::new).reset(String::clear).build();
///
/// let mut text = pool.get();
/// text.get_mut().push_str("hello");
/// text.return_to_pool();
///
/// // The next checkout observes a clean instance.
/// assert!(pool.get().get().is_empty());
/// ```
pub struct ObjectPool<T> {
    shared: Rc<PoolShared<T>>,
}

impl<T> ObjectPool<T> {
    /// Creates a pool that builds new instances with `factory`.
    #[must_use]
    pub fn new(factory: impl Fn() -> T + 'static) -> Self {
        Self::builder(factory).build()
    }

    /// Starts building a pool with a reset hook, idle cap or prewarm count.
    pub fn builder(factory: impl Fn() -> T + 'static) -> ObjectPoolBuilder<T> {
        ObjectPoolBuilder {
            factory: Box::new(factory),
            reset: None,
            max_idle: None,
            prewarm: 0,
        }
    }

    /// Checks out an instance, reusing an idle one when available.
    #[must_use]
    pub fn get(&self) -> PoolWrapper<T> {
        PoolWrapper {
            value: Some(self.shared.take()),
            owner: Rc::downgrade(&self.shared),
        }
    }

    /// Returns a wrapper through this pool.
    ///
    /// # Errors
    ///
    /// Returns [`CisternError::ForeignPool`] if the wrapper belongs to another
    /// pool. The rejected wrapper still goes back to its own pool.
    pub fn put(&self, wrapper: PoolWrapper<T>) -> CisternResult<()> {
        if !self.owns(&wrapper) {
            tracing::warn!("rejected wrapper returned to a foreign object pool");
            return Err(CisternError::ForeignPool);
        }
        wrapper.return_to_pool();
        Ok(())
    }

    /// Whether `wrapper` was handed out by this pool.
    #[inline]
    #[must_use]
    pub fn owns(&self, wrapper: &PoolWrapper<T>) -> bool {
        std::ptr::eq(wrapper.owner.as_ptr(), Rc::as_ptr(&self.shared))
    }

    /// Number of idle instances on the free list.
    #[inline]
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.shared.free.borrow().len()
    }

    /// Usage counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.shared.created.get(),
            reused: self.shared.reused.get(),
            returned: self.shared.returned.get(),
            discarded: self.shared.discarded.get(),
        }
    }

    /// Drops every idle instance. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped: Vec<T> = std::mem::take(&mut *self.shared.free.borrow_mut());
        tracing::debug!(dropped = dropped.len(), "object pool cleared");
        dropped.len()
    }
}

impl<T> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("idle", &self.idle_count())
            .field("max_idle", &self.shared.max_idle)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Builder for [`ObjectPool`].
pub struct ObjectPoolBuilder<T> {
    factory: Factory<T>,
    reset: Option<ResetHook<T>>,
    max_idle: Option<usize>,
    prewarm: usize,
}

impl<T> ObjectPoolBuilder<T> {
    /// Hook run on every instance as it goes back on the free list.
    #[must_use]
    pub fn reset(mut self, hook: impl Fn(&mut T) + 'static) -> Self {
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
    pub fn build(self) -> ObjectPool<T> {
        let prewarm = match self.max_idle {
            Some(max) => self.prewarm.min(max),
            None => self.prewarm,
        };
        let free: Vec<T> = (0..prewarm).map(|_| (self.factory)()).collect();

        ObjectPool {
            shared: Rc::new(PoolShared {
                free: RefCell::new(free),
                factory: self.factory,
                reset: self.reset,
                max_idle: self.max_idle,
                created: Cell::new(prewarm as u64),
                reused: Cell::new(0),
                returned: Cell::new(0),
                discarded: Cell::new(0),
            }),
        }
    }
}

impl<T> fmt::Debug for ObjectPoolBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPoolBuilder")
            .field("max_idle", &self.max_idle)
            .field("prewarm", &self.prewarm)
            .field("has_reset", &self.reset.is_some())
            .finish_non_exhaustive()
    }
}

/// A checked-out instance that knows which pool it came from.
///
/// The payload is reached through [`get`](Self::get) and
/// [`get_mut`](Self::get_mut). The wrapper goes back to its pool on
/// [`return_to_pool`](Self::return_to_pool) or when dropped; returning it
/// twice cannot be expressed because both consume the wrapper.
pub struct PoolWrapper<T> {
    /// Always `Some` until the wrapper is consumed.
    value: Option<T>,
    owner: Weak<PoolShared<T>>,
}

impl<T> PoolWrapper<T> {
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
    pub fn pool(&self) -> Option<ObjectPool<T>> {
        self.owner.upgrade().map(|shared| ObjectPool { shared })
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

impl<T> Drop for PoolWrapper<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            if let Some(owner) = self.owner.upgrade() {
                owner.give_back(value);
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PoolWrapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolWrapper")
            .field("value", &self.value)
            .field("pool_alive", &(self.owner.strong_count() > 0))
            .finish()
    }
}
