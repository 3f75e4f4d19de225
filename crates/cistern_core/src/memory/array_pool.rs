//! # Array Pools
//!
//! Capacity-bucketed caches of fixed-size buffers.
//!
//! ## Retention Policy
//!
//! ```text
//!   release(buffer, max)
//!        │
//!        ├── bucket.len() < max ──────────> Retained   (reused by next rent)
//!        ├── shared tier accepts ─────────> Overflowed (concurrent pool only)
//!        └── otherwise ───────────────────> Discarded  (left to the allocator)
//! ```
//!
//! Bursty workloads can return far more buffers than steady state needs; the
//! per-bucket cap bounds how much of that burst stays resident.
//!
//! Rented buffers hold whatever the previous user left in them unless
//! requested through `rent_cleared`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::bucket::{allocate, Bucket, SizeClasses};
use super::shared_cache::{BoundedSharedCache, SharedArrayCache};
use super::slice::PoolSlice;
use crate::config::ArrayPoolConfig;
use crate::error::{CisternError, CisternResult};

/// What happened to a released buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Kept in its bucket for reuse.
    Retained,
    /// Bucket full; handed to the shared tier.
    Overflowed,
    /// Dropped.
    Discarded,
}

/// Counters describing how an array pool has been used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArrayPoolStats {
    /// `rent` calls that succeeded.
    pub rents: u64,
    /// Rents served from a bucket.
    pub hits: u64,
    /// Rents served from the shared tier.
    pub shared_hits: u64,
    /// Rents that allocated a new buffer.
    pub allocations: u64,
    /// Releases kept in a bucket.
    pub retained: u64,
    /// Releases handed to the shared tier.
    pub overflowed: u64,
    /// Releases dropped.
    pub discarded: u64,
}

/// Overwrites every element with `T::default()`.
#[inline]
pub fn clear_buffer<T: Default>(buffer: &mut [T]) {
    buffer.fill_with(T::default);
}

/// Logs a released buffer whose length has no bucket. Oversized buffers are
/// expected; any other length means the caller returned a foreign buffer.
fn note_unbucketed(classes: &SizeClasses, length: usize) {
    if length > classes.max_class() {
        tracing::trace!(length, "oversized buffer released, dropping");
    } else {
        tracing::warn!(length, "buffer length is not a pool capacity class, dropping");
    }
}

/// Anything a [`PoolSlice`] can rent from and release to.
pub trait ArraySource<T> {
    /// Rents a buffer of at least `length` elements.
    ///
    /// # Errors
    ///
    /// Returns [`CisternError::InvalidLength`] if `length` is zero.
    fn rent(&self, length: usize) -> CisternResult<Box<[T]>>;

    /// Releases a buffer, keeping it only if its bucket holds fewer than
    /// `max_bucket_amount` idle buffers.
    fn release(&self, buffer: Box<[T]>, max_bucket_amount: usize) -> ReleaseOutcome;

    /// Default retention cap per bucket.
    fn max_per_bucket(&self) -> usize;

    /// Resets a buffer's contents before release.
    fn clear_buffer(&self, buffer: &mut [T]);

    /// Releases with the default retention cap.
    fn release_default(&self, buffer: Box<[T]>) -> ReleaseOutcome {
        self.release(buffer, self.max_per_bucket())
    }
}

impl<T, P: ArraySource<T> + ?Sized> ArraySource<T> for &P {
    #[inline]
    fn rent(&self, length: usize) -> CisternResult<Box<[T]>> {
        (**self).rent(length)
    }

    #[inline]
    fn release(&self, buffer: Box<[T]>, max_bucket_amount: usize) -> ReleaseOutcome {
        (**self).release(buffer, max_bucket_amount)
    }

    #[inline]
    fn max_per_bucket(&self) -> usize {
        (**self).max_per_bucket()
    }

    #[inline]
    fn clear_buffer(&self, buffer: &mut [T]) {
        (**self).clear_buffer(buffer);
    }
}

impl<T, P: ArraySource<T> + ?Sized> ArraySource<T> for Arc<P> {
    #[inline]
    fn rent(&self, length: usize) -> CisternResult<Box<[T]>> {
        (**self).rent(length)
    }

    #[inline]
    fn release(&self, buffer: Box<[T]>, max_bucket_amount: usize) -> ReleaseOutcome {
        (**self).release(buffer, max_bucket_amount)
    }

    #[inline]
    fn max_per_bucket(&self) -> usize {
        (**self).max_per_bucket()
    }

    #[inline]
    fn clear_buffer(&self, buffer: &mut [T]) {
        (**self).clear_buffer(buffer);
    }
}

// =============================================================================
// Single-threaded pool
// =============================================================================

/// A single-threaded array pool.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread or a
/// [`ConcurrentArrayPool`].
///
/// # Example
///
/// ```rust
/// use cistern_core::{ArrayPool, ReleaseOutcome};
///
/// let pool: ArrayPool<u8> = ArrayPool::new();
///
/// let buffer = pool.rent(100)?;
/// assert_eq!(buffer.len(), 128);
///
/// assert_eq!(pool.release(buffer, 4), ReleaseOutcome::Retained);
/// assert_eq!(pool.rent(120)?.len(), 128);
/// # Ok::<(), cistern_core::CisternError>(())
/// ```
pub struct ArrayPool<T> {
    classes: SizeClasses,
    buckets: RefCell<Vec<Bucket<T>>>,
    max_per_bucket: usize,
    clear_on_release: bool,
    stats: Cell<ArrayPoolStats>,
}

impl<T: Default> ArrayPool<T> {
    /// Creates a pool with the default bucket geometry.
    #[must_use]
    pub fn new() -> Self {
        Self::from_valid_config(&ArrayPoolConfig::default())
    }

    /// Creates a pool from a config section.
    ///
    /// # Errors
    ///
    /// Returns [`CisternError::InvalidConfig`] if the config is invalid.
    pub fn with_config(config: &ArrayPoolConfig) -> CisternResult<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: &ArrayPoolConfig) -> Self {
        let classes = SizeClasses::new(config.min_bucket_length, config.max_array_length);
        let buckets = (0..classes.count())
            .map(|index| Bucket::new(classes.capacity_of(index)))
            .collect();

        Self {
            classes,
            buckets: RefCell::new(buckets),
            max_per_bucket: config.max_per_bucket,
            clear_on_release: config.clear_on_release,
            stats: Cell::new(ArrayPoolStats::default()),
        }
    }

    /// Rents a buffer of at least `length` elements.
    ///
    /// # Errors
    ///
    /// Returns [`CisternError::InvalidLength`] if `length` is zero.
    pub fn rent(&self, length: usize) -> CisternResult<Box<[T]>> {
        if length == 0 {
            return Err(CisternError::InvalidLength(length));
        }
        self.record(|s| s.rents += 1);

        let Some(index) = self.classes.index_for_length(length) else {
            self.record(|s| s.allocations += 1);
            tracing::trace!(length, "oversized rent, allocating exact buffer");
            return Ok(allocate(length));
        };

        let idle = self.buckets.borrow_mut()[index].pop();
        if let Some(buffer) = idle {
            self.record(|s| s.hits += 1);
            return Ok(buffer);
        }

        self.record(|s| s.allocations += 1);
        Ok(allocate(self.classes.capacity_of(index)))
    }

    /// Rents a buffer whose elements are all `T::default()`.
    ///
    /// # Errors
    ///
    /// Returns [`CisternError::InvalidLength`] if `length` is zero.
    pub fn rent_cleared(&self, length: usize) -> CisternResult<Box<[T]>> {
        let mut buffer = self.rent(length)?;
        clear_buffer(&mut buffer);
        Ok(buffer)
    }

    /// Rents a buffer wrapped in a [`PoolSlice`] of logical length `size`.
    ///
    /// # Errors
    ///
    /// See [`PoolSlice::rent`].
    pub fn rent_slice(&self, size: usize) -> CisternResult<PoolSlice<T, &Self>> {
        PoolSlice::rent(self, size, self.clear_on_release)
    }

    /// Releases a buffer, keeping it only if its bucket holds fewer than
    /// `max_bucket_amount` idle buffers.
    ///
    /// Buffers whose length is not one of this pool's capacity classes are
    /// dropped.
    pub fn release(&self, buffer: Box<[T]>, max_bucket_amount: usize) -> ReleaseOutcome {
        let Some(index) = self.classes.index_for_capacity(buffer.len()) else {
            note_unbucketed(&self.classes, buffer.len());
            self.record(|s| s.discarded += 1);
            return ReleaseOutcome::Discarded;
        };

        let pushed = self.buckets.borrow_mut()[index].push_capped(buffer, max_bucket_amount);
        match pushed {
            Ok(()) => {
                self.record(|s| s.retained += 1);
                ReleaseOutcome::Retained
            }
            Err(excess) => {
                tracing::debug!(
                    capacity = excess.len(),
                    max = max_bucket_amount,
                    "bucket full, discarding buffer"
                );
                self.record(|s| s.discarded += 1);
                ReleaseOutcome::Discarded
            }
        }
    }

    /// Releases with the configured default cap.
    pub fn release_default(&self, buffer: Box<[T]>) -> ReleaseOutcome {
        self.release(buffer, self.max_per_bucket)
    }

    fn record(&self, update: impl FnOnce(&mut ArrayPoolStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }
}

impl<T> ArrayPool<T> {
    /// Idle buffers held for `capacity`. Zero if `capacity` is not a class.
    #[must_use]
    pub fn idle_count(&self, capacity: usize) -> usize {
        self.classes
            .index_for_capacity(capacity)
            .map_or(0, |index| self.buckets.borrow()[index].len())
    }

    /// Default retention cap per bucket.
    #[inline]
    #[must_use]
    pub const fn max_per_bucket(&self) -> usize {
        self.max_per_bucket
    }

    /// Usage counters.
    #[must_use]
    pub fn stats(&self) -> ArrayPoolStats {
        self.stats.get()
    }

    /// Drops every idle buffer. Returns how many were dropped.
    pub fn trim(&self) -> usize {
        let dropped = self.buckets.borrow_mut().iter_mut().map(Bucket::clear).sum();
        tracing::debug!(dropped, "array pool trimmed");
        dropped
    }
}

impl<T: Default> Default for ArrayPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> ArraySource<T> for ArrayPool<T> {
    fn rent(&self, length: usize) -> CisternResult<Box<[T]>> {
        ArrayPool::rent(self, length)
    }

    fn release(&self, buffer: Box<[T]>, max_bucket_amount: usize) -> ReleaseOutcome {
        ArrayPool::release(self, buffer, max_bucket_amount)
    }

    fn max_per_bucket(&self) -> usize {
        self.max_per_bucket
    }

    fn clear_buffer(&self, buffer: &mut [T]) {
        clear_buffer(buffer);
    }
}

impl<T> fmt::Debug for ArrayPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayPool")
            .field("classes", &self.classes)
            .field("max_per_bucket", &self.max_per_bucket)
            .field("stats", &self.stats.get())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Concurrent pool
// =============================================================================

#[derive(Default)]
struct AtomicArrayStats {
    rents: AtomicU64,
    hits: AtomicU64,
    shared_hits: AtomicU64,
    allocations: AtomicU64,
    retained: AtomicU64,
    overflowed: AtomicU64,
    discarded: AtomicU64,
}

impl AtomicArrayStats {
    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ArrayPoolStats {
        ArrayPoolStats {
            rents: self.rents.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            shared_hits: self.shared_hits.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            retained: self.retained.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// A thread-safe array pool.
///
/// Each bucket has its own lock, so rents of different capacities never
/// contend. An optional [`SharedArrayCache`] acts as a second tier: it
/// absorbs buffers a full bucket cannot keep and serves rents that find
/// their bucket empty.
///
/// # Example
///
/// ```rust
/// use cistern_core::ConcurrentArrayPool;
/// use std::sync::Arc;
/// use std::thread;
///
/// let pool = Arc::new(ConcurrentArrayPool::<u32>::new());
///
/// let worker = {
///     let pool = Arc::clone(&pool);
///     thread::spawn(move || {
///         let buffer = pool.rent(1000).unwrap();
///         pool.release_default(buffer);
///     })
/// };
/// worker.join().unwrap();
///
/// assert_eq!(pool.idle_count(1024), 1);
/// ```
pub struct ConcurrentArrayPool<T> {
    classes: SizeClasses,
    buckets: Box<[Mutex<Bucket<T>>]>,
    max_per_bucket: usize,
    clear_on_release: bool,
    shared: Option<Arc<dyn SharedArrayCache<T>>>,
    stats: AtomicArrayStats,
}

impl<T: Default + Send + 'static> ConcurrentArrayPool<T> {
    /// Creates a pool with the default bucket geometry and no shared tier.
    #[must_use]
    pub fn new() -> Self {
        Self::from_valid_config(&ArrayPoolConfig::default(), None)
    }

    /// Creates a pool from a config section.
    ///
    /// If `config.shared_tier` is set the pool gets its own
    /// [`BoundedSharedCache`]; use [`with_shared_cache`](Self::with_shared_cache)
    /// to share one cache between pools.
    ///
    /// # Errors
    ///
    /// Returns [`CisternError::InvalidConfig`] if the config is invalid.
    pub fn with_config(config: &ArrayPoolConfig) -> CisternResult<Self> {
        config.validate()?;
        let shared = config.shared_tier.then(|| {
            Arc::new(BoundedSharedCache::new(config.shared_tier_per_capacity))
                as Arc<dyn SharedArrayCache<T>>
        });
        Ok(Self::from_valid_config(config, shared))
    }

    /// Creates a pool that overflows into `shared`.
    ///
    /// # Errors
    ///
    /// Returns [`CisternError::InvalidConfig`] if the config is invalid.
    pub fn with_shared_cache(
        config: &ArrayPoolConfig,
        shared: Arc<dyn SharedArrayCache<T>>,
    ) -> CisternResult<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config, Some(shared)))
    }

    fn from_valid_config(
        config: &ArrayPoolConfig,
        shared: Option<Arc<dyn SharedArrayCache<T>>>,
    ) -> Self {
        let classes = SizeClasses::new(config.min_bucket_length, config.max_array_length);
        let buckets = (0..classes.count())
            .map(|index| Mutex::new(Bucket::new(classes.capacity_of(index))))
            .collect();

        Self {
            classes,
            buckets,
            max_per_bucket: config.max_per_bucket,
            clear_on_release: config.clear_on_release,
            shared,
            stats: AtomicArrayStats::default(),
        }
    }

    /// Rents a buffer of at least `length` elements.
    ///
    /// Looks in the bucket first, then the shared tier, then allocates.
    ///
    /// # Errors
    ///
    /// Returns [`CisternError::InvalidLength`] if `length` is zero.
    pub fn rent(&self, length: usize) -> CisternResult<Box<[T]>> {
        if length == 0 {
            return Err(CisternError::InvalidLength(length));
        }
        AtomicArrayStats::bump(&self.stats.rents);

        let Some(index) = self.classes.index_for_length(length) else {
            AtomicArrayStats::bump(&self.stats.allocations);
            tracing::trace!(length, "oversized rent, allocating exact buffer");
            return Ok(allocate(length));
        };

        let idle = self.buckets[index].lock().pop();
        if let Some(buffer) = idle {
            AtomicArrayStats::bump(&self.stats.hits);
            return Ok(buffer);
        }

        let capacity = self.classes.capacity_of(index);
        if let Some(buffer) = self.shared.as_ref().and_then(|shared| shared.take(capacity)) {
            AtomicArrayStats::bump(&self.stats.shared_hits);
            return Ok(buffer);
        }

        AtomicArrayStats::bump(&self.stats.allocations);
        Ok(allocate(capacity))
    }

    /// Rents a buffer whose elements are all `T::default()`.
    ///
    /// # Errors
    ///
    /// Returns [`CisternError::InvalidLength`] if `length` is zero.
    pub fn rent_cleared(&self, length: usize) -> CisternResult<Box<[T]>> {
        let mut buffer = self.rent(length)?;
        clear_buffer(&mut buffer);
        Ok(buffer)
    }

    /// Rents a buffer wrapped in a [`PoolSlice`] of logical length `size`.
    ///
    /// # Errors
    ///
    /// See [`PoolSlice::rent`].
    pub fn rent_slice(&self, size: usize) -> CisternResult<PoolSlice<T, &Self>> {
        PoolSlice::rent(self, size, self.clear_on_release)
    }

    /// Releases a buffer, keeping it only if its bucket holds fewer than
    /// `max_bucket_amount` idle buffers. A full bucket overflows into the
    /// shared tier when one is attached.
    pub fn release(&self, buffer: Box<[T]>, max_bucket_amount: usize) -> ReleaseOutcome {
        let Some(index) = self.classes.index_for_capacity(buffer.len()) else {
            note_unbucketed(&self.classes, buffer.len());
            AtomicArrayStats::bump(&self.stats.discarded);
            return ReleaseOutcome::Discarded;
        };

        let pushed = self.buckets[index].lock().push_capped(buffer, max_bucket_amount);
        let Err(excess) = pushed else {
            AtomicArrayStats::bump(&self.stats.retained);
            return ReleaseOutcome::Retained;
        };

        if let Some(shared) = &self.shared {
            if shared.offer(excess) {
                AtomicArrayStats::bump(&self.stats.overflowed);
                return ReleaseOutcome::Overflowed;
            }
            tracing::debug!(
                max = max_bucket_amount,
                "bucket and shared tier full, discarding buffer"
            );
        } else {
            tracing::debug!(
                capacity = excess.len(),
                max = max_bucket_amount,
                "bucket full, discarding buffer"
            );
        }

        AtomicArrayStats::bump(&self.stats.discarded);
        ReleaseOutcome::Discarded
    }

    /// Releases with the configured default cap.
    pub fn release_default(&self, buffer: Box<[T]>) -> ReleaseOutcome {
        self.release(buffer, self.max_per_bucket)
    }
}

impl<T> ConcurrentArrayPool<T> {
    /// Idle buffers held for `capacity` in this pool's own buckets.
    #[must_use]
    pub fn idle_count(&self, capacity: usize) -> usize {
        self.classes
            .index_for_capacity(capacity)
            .map_or(0, |index| self.buckets[index].lock().len())
    }

    /// Default retention cap per bucket.
    #[inline]
    #[must_use]
    pub const fn max_per_bucket(&self) -> usize {
        self.max_per_bucket
    }

    /// Whether a shared tier is attached.
    #[inline]
    #[must_use]
    pub fn has_shared_tier(&self) -> bool {
        self.shared.is_some()
    }

    /// Usage counters. Relaxed snapshot.
    #[must_use]
    pub fn stats(&self) -> ArrayPoolStats {
        self.stats.snapshot()
    }

    /// Drops every idle buffer in this pool's buckets. The shared tier is
    /// left alone. Returns how many were dropped.
    pub fn trim(&self) -> usize {
        let dropped = self.buckets.iter().map(|bucket| bucket.lock().clear()).sum();
        tracing::debug!(dropped, "concurrent array pool trimmed");
        dropped
    }
}

impl<T: Default + Send + 'static> Default for ConcurrentArrayPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default + Send + 'static> ArraySource<T> for ConcurrentArrayPool<T> {
    fn rent(&self, length: usize) -> CisternResult<Box<[T]>> {
        ConcurrentArrayPool::rent(self, length)
    }

    fn release(&self, buffer: Box<[T]>, max_bucket_amount: usize) -> ReleaseOutcome {
        ConcurrentArrayPool::release(self, buffer, max_bucket_amount)
    }

    fn max_per_bucket(&self) -> usize {
        self.max_per_bucket
    }

    fn clear_buffer(&self, buffer: &mut [T]) {
        clear_buffer(buffer);
    }
}

impl<T> fmt::Debug for ConcurrentArrayPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentArrayPool")
            .field("classes", &self.classes)
            .field("max_per_bucket", &self.max_per_bucket)
            .field("shared_tier", &self.shared.is_some())
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}
