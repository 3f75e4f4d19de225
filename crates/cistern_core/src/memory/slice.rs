//! # Pool Slice
//!
//! A rented buffer paired with the number of elements actually in use.
//!
//! Pooled buffers are rounded up to their capacity class, so a rent of 100
//! elements usually yields 128. The slice remembers the 100 and never exposes
//! the rest. When the slice is dropped the buffer goes back to its pool,
//! cleared first if requested.
//!
//! ```text
//!   buffer:  [ used used used ... used | spare spare spare ]
//!             └──────── size ────────┘
//!             └──────────────── capacity ─────────────────┘
//! ```

use std::fmt;

use super::array_pool::ArraySource;
use crate::error::{CisternError, CisternResult};

/// A scoped view of the first `size` elements of a rented buffer.
///
/// `P` is anything implementing [`ArraySource`]: a pool reference, an
/// `Arc` of a pool, or a pool by value.
///
/// # Example
///
/// ```rust
/// use cistern_core::ArrayPool;
///
/// let pool: ArrayPool<u8> = ArrayPool::new();
/// {
///     let mut slice = pool.rent_slice(100)?;
///     assert_eq!(slice.len(), 100);
///     assert_eq!(slice.capacity(), 128);
///
///     slice.as_mut_slice().fill(7);
///     assert_eq!(slice.slice(90, 10)?, &[7; 10]);
///     assert!(slice.slice(95, 10).is_err());
/// }
/// // Back in the pool.
/// assert_eq!(pool.idle_count(128), 1);
/// # Ok::<(), cistern_core::CisternError>(())
/// ```
pub struct PoolSlice<T, P>
where
    P: ArraySource<T>,
{
    pool: P,
    /// Always `Some` until the slice is dropped.
    buffer: Option<Box<[T]>>,
    size: usize,
    clear_on_release: bool,
}

impl<T, P> PoolSlice<T, P>
where
    P: ArraySource<T>,
{
    /// Wraps an already rented buffer.
    ///
    /// # Errors
    ///
    /// Returns [`CisternError::SizeExceedsCapacity`] if `size` is larger than
    /// the buffer. The buffer is released back to `pool` first.
    pub fn new(
        pool: P,
        buffer: Box<[T]>,
        size: usize,
        clear_on_release: bool,
    ) -> CisternResult<Self> {
        let capacity = buffer.len();
        if size > capacity {
            pool.release_default(buffer);
            return Err(CisternError::SizeExceedsCapacity { size, capacity });
        }

        Ok(Self {
            pool,
            buffer: Some(buffer),
            size,
            clear_on_release,
        })
    }

    /// Rents a buffer for `size` elements and wraps it.
    ///
    /// A zero `size` still rents the smallest buffer, giving an empty slice.
    ///
    /// # Errors
    ///
    /// Propagates rent failures from the pool.
    pub fn rent(pool: P, size: usize, clear_on_release: bool) -> CisternResult<Self> {
        let buffer = pool.rent(size.max(1))?;
        Self::new(pool, buffer, size, clear_on_release)
    }

    #[inline]
    fn buffer(&self) -> &[T] {
        match &self.buffer {
            Some(buffer) => buffer,
            None => unreachable!("buffer taken from a live slice"),
        }
    }

    #[inline]
    fn buffer_mut(&mut self) -> &mut [T] {
        match &mut self.buffer {
            Some(buffer) => buffer,
            None => unreachable!("buffer taken from a live slice"),
        }
    }

    /// Logical length.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Whether the logical length is zero.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Whether the slice holds at least one element.
    #[inline]
    #[must_use]
    pub fn any(&self) -> bool {
        self.buffer.is_some() && self.size > 0
    }

    /// Length of the underlying buffer.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer().len()
    }

    /// Whether the buffer is cleared before it goes back to the pool.
    #[inline]
    #[must_use]
    pub fn clears_on_release(&self) -> bool {
        self.clear_on_release
    }

    /// The first `len()` elements.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        let size = self.size;
        &self.buffer()[..size]
    }

    /// The first `len()` elements, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let size = self.size;
        &mut self.buffer_mut()[..size]
    }

    /// `len` elements starting at `start`, within the logical length.
    ///
    /// # Errors
    ///
    /// Returns [`CisternError::SliceOutOfBounds`] if the range reaches past `len()`.
    pub fn slice(&self, start: usize, len: usize) -> CisternResult<&[T]> {
        let end = self.checked_end(start, len)?;
        Ok(&self.as_slice()[start..end])
    }

    /// Mutable form of [`slice`](Self::slice).
    ///
    /// # Errors
    ///
    /// Returns [`CisternError::SliceOutOfBounds`] if the range reaches past `len()`.
    pub fn slice_mut(&mut self, start: usize, len: usize) -> CisternResult<&mut [T]> {
        let end = self.checked_end(start, len)?;
        Ok(&mut self.as_mut_slice()[start..end])
    }

    fn checked_end(&self, start: usize, len: usize) -> CisternResult<usize> {
        start
            .checked_add(len)
            .filter(|end| *end <= self.size)
            .ok_or(CisternError::SliceOutOfBounds {
                start,
                len,
                size: self.size,
            })
    }

    /// The pool this slice releases to.
    #[inline]
    #[must_use]
    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Returns the buffer to its pool now.
    #[inline]
    pub fn release(self) {
        drop(self);
    }
}

impl<T, P> Drop for PoolSlice<T, P>
where
    P: ArraySource<T>,
{
    fn drop(&mut self) {
        if let Some(mut buffer) = self.buffer.take() {
            if self.clear_on_release {
                self.pool.clear_buffer(&mut buffer);
            }
            self.pool.release_default(buffer);
        }
    }
}

impl<T: fmt::Debug, P> fmt::Debug for PoolSlice<T, P>
where
    P: ArraySource<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSlice")
            .field("items", &self.as_slice())
            .field("capacity", &self.capacity())
            .field("clear_on_release", &self.clear_on_release)
            .finish_non_exhaustive()
    }
}
