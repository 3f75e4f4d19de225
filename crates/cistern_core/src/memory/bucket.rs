//! # Array Buckets
//!
//! Capacity classes and the per-class idle stacks used by the array pools.
//!
//! ## Keying
//!
//! Buckets are keyed by power-of-two size classes:
//!
//! ```text
//!   rent(1..=16)    -> class 16    (bucket 0)
//!   rent(17..=32)   -> class 32    (bucket 1)
//!   rent(33..=64)   -> class 64    (bucket 2)
//!   ...
//!   rent(> max)     -> exact size, never retained
//! ```
//!
//! Every buffer a bucket stores has exactly the bucket's capacity.

/// Power-of-two capacity classes between a minimum and a maximum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SizeClasses {
    min_len: usize,
    max_class: usize,
    count: usize,
}

impl SizeClasses {
    /// Classes from `min_len` up to the largest power of two not above
    /// `max_len`. `min_len` must be a power of two.
    pub(crate) fn new(min_len: usize, max_len: usize) -> Self {
        debug_assert!(min_len.is_power_of_two());
        let max_len = max_len.max(min_len);
        // Largest power of two <= max_len.
        let max_class = 1_usize << (usize::BITS - 1 - max_len.leading_zeros());
        let count = (max_class.trailing_zeros() - min_len.trailing_zeros()) as usize + 1;

        Self {
            min_len,
            max_class,
            count,
        }
    }

    /// Number of buckets.
    #[inline]
    pub(crate) const fn count(&self) -> usize {
        self.count
    }

    /// Largest class capacity.
    #[inline]
    pub(crate) const fn max_class(&self) -> usize {
        self.max_class
    }

    /// Bucket serving a rent of `length`, or `None` if it is above the largest class.
    #[inline]
    pub(crate) fn index_for_length(&self, length: usize) -> Option<usize> {
        let capacity = length.max(self.min_len).checked_next_power_of_two()?;
        self.index_for_capacity(capacity)
    }

    /// Bucket whose capacity is exactly `capacity`.
    #[inline]
    pub(crate) fn index_for_capacity(&self, capacity: usize) -> Option<usize> {
        if !capacity.is_power_of_two() || capacity < self.min_len || capacity > self.max_class {
            return None;
        }
        Some((capacity.trailing_zeros() - self.min_len.trailing_zeros()) as usize)
    }

    /// Capacity of bucket `index`.
    #[inline]
    pub(crate) const fn capacity_of(&self, index: usize) -> usize {
        self.min_len << index
    }
}

/// Idle buffers of a single capacity class.
#[derive(Debug)]
pub(crate) struct Bucket<T> {
    capacity: usize,
    idle: Vec<Box<[T]>>,
}

impl<T> Bucket<T> {
    pub(crate) const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            idle: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.idle.len()
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Option<Box<[T]>> {
        self.idle.pop()
    }

    /// Stores `buffer` unless the bucket already holds `max` idle buffers,
    /// in which case the buffer is handed back.
    #[inline]
    pub(crate) fn push_capped(&mut self, buffer: Box<[T]>, max: usize) -> Result<(), Box<[T]>> {
        debug_assert_eq!(buffer.len(), self.capacity);
        if self.idle.len() >= max {
            return Err(buffer);
        }
        self.idle.push(buffer);
        Ok(())
    }

    /// Drops every idle buffer. Returns how many were dropped.
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.idle.len();
        self.idle.clear();
        dropped
    }
}

/// Allocates a buffer of `capacity` default elements.
#[inline]
pub(crate) fn allocate<T: Default>(capacity: usize) -> Box<[T]> {
    std::iter::repeat_with(T::default).take(capacity).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_geometry() {
        let classes = SizeClasses::new(16, 1024);
        assert_eq!(classes.count(), 7);
        assert_eq!(classes.max_class(), 1024);
        assert_eq!(classes.capacity_of(0), 16);
        assert_eq!(classes.capacity_of(6), 1024);
    }

    #[test]
    fn test_non_power_of_two_max() {
        let classes = SizeClasses::new(16, 1000);
        assert_eq!(classes.max_class(), 512);
        assert_eq!(classes.index_for_length(600), None);
    }

    #[test]
    fn test_index_for_length_rounds_up() {
        let classes = SizeClasses::new(16, 1024);
        assert_eq!(classes.index_for_length(1), Some(0));
        assert_eq!(classes.index_for_length(16), Some(0));
        assert_eq!(classes.index_for_length(17), Some(1));
        assert_eq!(classes.index_for_length(1024), Some(6));
        assert_eq!(classes.index_for_length(1025), None);
        assert_eq!(classes.index_for_length(usize::MAX), None);
    }

    #[test]
    fn test_index_for_capacity_exact_only() {
        let classes = SizeClasses::new(16, 1024);
        assert_eq!(classes.index_for_capacity(64), Some(2));
        assert_eq!(classes.index_for_capacity(65), None);
        assert_eq!(classes.index_for_capacity(8), None);
        assert_eq!(classes.index_for_capacity(2048), None);
    }

    #[test]
    fn test_bucket_cap() {
        let mut bucket: Bucket<u8> = Bucket::new(4);
        assert!(bucket.push_capped(allocate(4), 1).is_ok());
        assert!(bucket.push_capped(allocate(4), 1).is_err());
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket.clear(), 1);
        assert!(bucket.pop().is_none());
    }
}
