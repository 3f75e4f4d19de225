//! # Synchronization Primitives
//!
//! Shared mutable state for producer/consumer threads.
//!
//! ## Components
//!
//! - [`ObservableCollection`]: a lock-protected list that raises change
//!   notifications
//! - [`QueueDispatcher`]: a job queue pumped by the thread that owns it
//! - [`ExecutionContext`]: the thread's current dispatcher, used to route
//!   ambient notifications
//!
//! ## Thread Model
//!
//! ```text
//!   Producer threads ──push──┐
//!                            ▼
//!                 ┌─────────────────────┐
//!                 │ ObservableCollection│──inline──> handler (same thread)
//!                 └─────────┬───────────┘
//!                           │ post
//!                           ▼
//!                 ┌─────────────────────┐
//!                 │   QueueDispatcher   │──run_pending──> handler (owner thread)
//!                 └─────────────────────┘
//! ```

mod change;
mod dispatch;
mod observable;
mod owner;

pub use change::CollectionChange;
pub use dispatch::{ContextGuard, Dispatcher, ExecutionContext, Job, QueueDispatcher};
pub use observable::{ChangeHandler, NotifySink, ObservableCollection, SubscriptionId};
