//! # Pooled Text Builders
//!
//! Reusable `String` buffers for code that formats text on a hot path.
//! Builders come back empty; ones that grew past the retention limit are
//! shrunk before they are reused.

use std::fmt::{self, Write as _};

use cistern_core::{ConcurrentObjectPool, ConcurrentPoolWrapper, PoolStats};

use crate::config::TextConfig;

/// A thread-safe pool of `String` builders.
///
/// # Example
///
/// ```rust
/// use cistern::{TextBuilderPool, TextConfig};
///
/// let pool = TextBuilderPool::new(&TextConfig::default());
/// let line = pool.build(|text| {
///     text.push_str("frame ");
///     text.push_str("42");
/// });
/// assert_eq!(line, "frame 42");
/// assert_eq!(pool.idle_count(), 1);
/// ```
#[derive(Clone)]
pub struct TextBuilderPool {
    pool: ConcurrentObjectPool<String>,
    config: TextConfig,
}

impl TextBuilderPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new(config: &TextConfig) -> Self {
        let initial = config.initial_capacity;
        let max_retained = config.max_retained_capacity;

        let pool = ConcurrentObjectPool::builder(move || String::with_capacity(initial))
            .reset(move |text: &mut String| {
                text.clear();
                if text.capacity() > max_retained {
                    tracing::debug!(
                        capacity = text.capacity(),
                        max = max_retained,
                        "shrinking oversized text builder"
                    );
                    text.shrink_to(initial);
                }
            })
            .build();

        Self {
            pool,
            config: config.clone(),
        }
    }

    /// Checks out an empty builder. It returns to the pool when dropped.
    #[must_use]
    pub fn get(&self) -> ConcurrentPoolWrapper<String> {
        self.pool.get()
    }

    /// Runs `write` against a pooled builder and returns a copy of the text.
    pub fn build(&self, write: impl FnOnce(&mut String)) -> String {
        let mut builder = self.pool.get();
        write(builder.get_mut());
        builder.get().clone()
    }

    /// Formats `args` through a pooled builder.
    ///
    /// ```rust
    /// use cistern::{TextBuilderPool, TextConfig};
    ///
    /// let pool = TextBuilderPool::new(&TextConfig::default());
    /// assert_eq!(pool.format(format_args!("{}-{}", 1, 2)), "1-2");
    /// ```
    #[must_use]
    pub fn format(&self, args: fmt::Arguments<'_>) -> String {
        self.build(|text| {
            // Writing into a String cannot fail.
            let _ = text.write_fmt(args);
        })
    }

    /// Idle builders.
    #[inline]
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.pool.idle_count()
    }

    /// Usage counters.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Drops every idle builder. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        self.pool.clear()
    }

    /// The settings this pool was built with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &TextConfig {
        &self.config
    }
}

impl fmt::Debug for TextBuilderPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextBuilderPool")
            .field("idle", &self.idle_count())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> TextConfig {
        TextConfig {
            initial_capacity: 8,
            max_retained_capacity: 64,
        }
    }

    #[test]
    fn test_builders_come_back_empty() {
        let pool = TextBuilderPool::new(&small_config());
        {
            let mut builder = pool.get();
            builder.get_mut().push_str("leftover");
        }

        let builder = pool.get();
        assert!(builder.get().is_empty());
        assert_eq!(pool.stats().reused, 1);
    }

    #[test]
    fn test_oversized_builder_shrinks() {
        let pool = TextBuilderPool::new(&small_config());
        {
            let mut builder = pool.get();
            builder.get_mut().push_str(&"x".repeat(1_000));
        }

        let builder = pool.get();
        assert!(builder.get().capacity() <= 64);
    }

    #[test]
    fn test_build_and_format() {
        let pool = TextBuilderPool::new(&small_config());

        assert_eq!(pool.build(|text| text.push_str("abc")), "abc");
        assert_eq!(pool.format(format_args!("{:>4}", 7)), "   7");
        assert_eq!(pool.stats().created, 1);
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.clear(), 1);
    }

    #[test]
    fn test_shared_across_threads() {
        let pool = TextBuilderPool::new(&small_config());
        std::thread::scope(|scope| {
            for t in 0..4 {
                let pool = pool.clone();
                scope.spawn(move || {
                    for i in 0..50 {
                        assert_eq!(pool.format(format_args!("{t}:{i}")), format!("{t}:{i}"));
                    }
                });
            }
        });
        assert!(pool.idle_count() <= 4);
    }
}
