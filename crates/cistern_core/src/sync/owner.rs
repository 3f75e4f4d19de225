//! Write-lock owner tracking.
//!
//! Each thread gets a non-zero token the first time it asks. A lock records
//! the token of the thread currently holding it exclusively, so that thread
//! can later ask "is it me?" without touching the lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// Zero means "nobody".
const NO_OWNER: u64 = 0;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static TOKEN: u64 = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// The calling thread's token.
#[inline]
pub(crate) fn current_token() -> u64 {
    TOKEN.with(|token| *token)
}

/// Records which thread holds an exclusive lock.
#[derive(Debug)]
pub(crate) struct LockOwner {
    token: AtomicU64,
}

impl LockOwner {
    pub(crate) const fn new() -> Self {
        Self {
            token: AtomicU64::new(NO_OWNER),
        }
    }

    /// Marks the calling thread as owner. Call only after acquiring the lock.
    #[inline]
    pub(crate) fn claim(&self) {
        // Relaxed: a thread can only ever observe its own token here if it
        // stored it itself.
        self.token.store(current_token(), Ordering::Relaxed);
    }

    /// Clears ownership. Call before releasing the lock.
    #[inline]
    pub(crate) fn release(&self) {
        self.token.store(NO_OWNER, Ordering::Relaxed);
    }

    /// Whether the calling thread currently holds the lock.
    #[inline]
    pub(crate) fn is_current_thread(&self) -> bool {
        self.token.load(Ordering::Relaxed) == current_token()
    }
}
