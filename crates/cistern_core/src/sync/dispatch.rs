//! # Dispatchers and Execution Contexts
//!
//! A [`Dispatcher`] is "the queue a callback must run on". A thread that owns
//! such a queue (a UI loop, a frame loop) installs it as its current
//! [`ExecutionContext`]; notifications raised on that thread are then posted
//! to the queue instead of running inline.
//!
//! ```text
//!   owner thread                          any thread
//!   ────────────                          ──────────
//!   let queue = QueueDispatcher::new();
//!   let _ctx = ExecutionContext::enter(queue.handle());
//!   collection.push(x) ──post──> [ crossbeam queue ]
//!   queue.run_pending()  <────────────────┘
//! ```

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

/// A unit of work posted to a dispatcher.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs posted jobs on its own schedule.
pub trait Dispatcher: Send + Sync {
    /// Queues `job`. Must not run it inline while the caller waits.
    fn post(&self, job: Job);
}

/// A dispatcher backed by an unbounded crossbeam channel.
///
/// Jobs run only when the owning thread calls [`run_pending`](Self::run_pending)
/// or [`run_next`](Self::run_next).
pub struct QueueDispatcher {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
}

impl QueueDispatcher {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// A handle other threads can post through.
    #[must_use]
    pub fn handle(&self) -> Arc<dyn Dispatcher> {
        Arc::new(QueueHandle {
            sender: self.sender.clone(),
        })
    }

    /// Number of queued jobs.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Runs the jobs queued at the time of the call. Jobs those jobs post
    /// wait for the next call. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let queued = self.receiver.len();
        let mut ran = 0;
        for _ in 0..queued {
            match self.receiver.try_recv() {
                Ok(job) => {
                    job();
                    ran += 1;
                }
                Err(_) => break,
            }
        }
        ran
    }

    /// Runs jobs until the queue is empty, including jobs posted while pumping.
    /// Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Waits up to `timeout` for one job and runs it. Returns whether a job ran.
    pub fn run_next(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }
}

impl Default for QueueDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QueueDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueDispatcher")
            .field("pending", &self.pending())
            .finish()
    }
}

struct QueueHandle {
    sender: Sender<Job>,
}

impl Dispatcher for QueueHandle {
    fn post(&self, job: Job) {
        if self.sender.send(job).is_err() {
            // Queue owner is gone; nobody will ever run it.
            tracing::debug!("dispatcher queue closed, dropping posted job");
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<dyn Dispatcher>>> = const { RefCell::new(None) };
}

/// The calling thread's current dispatcher.
#[derive(Debug)]
pub struct ExecutionContext;

impl ExecutionContext {
    /// Installs `dispatcher` as this thread's context until the guard drops.
    ///
    /// Guards nest: dropping one restores whatever was current before it.
    #[must_use = "the context is uninstalled when the guard drops"]
    pub fn enter(dispatcher: Arc<dyn Dispatcher>) -> ContextGuard {
        let previous = CURRENT.with(|current| current.borrow_mut().replace(dispatcher));
        ContextGuard {
            previous,
            _not_send: PhantomData,
        }
    }

    /// This thread's current dispatcher, if any.
    #[must_use]
    pub fn current() -> Option<Arc<dyn Dispatcher>> {
        CURRENT.with(|current| current.borrow().clone())
    }
}

/// Restores the previous execution context when dropped.
///
/// Tied to the thread that created it.
pub struct ContextGuard {
    previous: Option<Arc<dyn Dispatcher>>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard")
            .field("has_previous", &self.previous.is_some())
            .finish()
    }
}
