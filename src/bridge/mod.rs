//! Async completion bridge for scheduled requests.
//!
//! When a [`Scheduler`] is configured, the dispatcher does not run the
//! handler itself. It creates a [`PendingOperation`], hands it to the
//! scheduler and blocks (asynchronously) on the matching
//! [`CompletionWaiter`] until the operation completes or its deadline
//! passes.
//!
//! Provides:
//! - [`PendingOperation`] / [`CompletionWaiter`] - the two halves of one operation
//! - [`Completion`] - how a scheduler finished an operation
//! - [`Scheduler`] - the seam, implemented for closures
//! - [`WorkerPoolScheduler`] - bounded queue drained by tokio tasks

mod pending;
mod scheduler;

pub use pending::{Completion, CompletionWaiter, OperationState, PendingOperation};
pub use scheduler::{Scheduler, WorkerPoolScheduler, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
