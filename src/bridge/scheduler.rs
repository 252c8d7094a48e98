//! Schedulers that accept pending operations.
//!
//! # Architecture
//!
//! ```text
//! dispatch 1 ─┐
//! dispatch 2 ─┼─► mpsc::Sender<PendingOperation> ─► Worker 1..N ─► handler
//! dispatch N ─┘
//! ```
//!
//! A full queue does not block the dispatcher: the operation completes with
//! `BadTooManyOperations` instead.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::pending::{Completion, PendingOperation};
use crate::error::{DispatchError, Result};
use crate::status::StatusCode;

/// Default number of worker tasks.
pub const DEFAULT_WORKERS: usize = 4;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Accepts operations and completes each exactly once, on any thread.
pub trait Scheduler: Send + Sync + 'static {
    fn schedule(&self, operation: PendingOperation);
}

impl<F> Scheduler for F
where
    F: Fn(PendingOperation) + Send + Sync + 'static,
{
    fn schedule(&self, operation: PendingOperation) {
        self(operation)
    }
}

/// Fixed pool of tokio tasks draining a bounded queue.
///
/// Each worker invokes the handler on its own task, so at most `workers`
/// handlers run at once. Operations whose deadline passed while queued
/// complete with `BadTimeout` without running.
pub struct WorkerPoolScheduler {
    tx: mpsc::Sender<PendingOperation>,
    queued: Arc<AtomicUsize>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPoolScheduler {
    /// Spawn `workers` tasks on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] for zero workers or capacity and
    /// [`DispatchError::Internal`] outside a tokio runtime.
    pub fn spawn(workers: usize, queue_capacity: usize) -> Result<Self> {
        if workers == 0 || queue_capacity == 0 {
            return Err(DispatchError::Config(
                "worker pool needs at least one worker and one queue slot".into(),
            ));
        }
        let runtime = Handle::try_current()
            .map_err(|e| DispatchError::Internal(format!("No runtime for worker pool: {e}")))?;

        let (tx, rx) = mpsc::channel(queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let queued = Arc::new(AtomicUsize::new(0));

        let workers = (0..workers)
            .map(|id| runtime.spawn(worker_loop(id, Arc::clone(&rx), Arc::clone(&queued))))
            .collect();

        debug!(queue_capacity, "worker pool started");
        Ok(Self { tx, queued, workers })
    }

    /// Operations accepted but not yet picked up by a worker.
    #[inline]
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting work and wait for queued operations to drain.
    pub async fn shutdown(self) {
        let Self { tx, workers, .. } = self;
        drop(tx);
        for worker in workers {
            let _ = worker.await;
        }
        debug!("worker pool stopped");
    }
}

impl Scheduler for WorkerPoolScheduler {
    fn schedule(&self, operation: PendingOperation) {
        self.queued.fetch_add(1, Ordering::AcqRel);
        match self.tx.try_send(operation) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(op)) => {
                self.queued.fetch_sub(1, Ordering::Release);
                warn!(type_id = op.request().type_id, "scheduler queue full");
                op.complete(Completion::Fail(StatusCode::BAD_TOO_MANY_OPERATIONS));
            }
            Err(mpsc::error::TrySendError::Closed(op)) => {
                self.queued.fetch_sub(1, Ordering::Release);
                warn!(type_id = op.request().type_id, "scheduler shut down");
                op.complete(Completion::Fail(StatusCode::BAD_SHUTDOWN));
            }
        }
    }
}

async fn worker_loop(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<PendingOperation>>>,
    queued: Arc<AtomicUsize>,
) {
    loop {
        // lock released before the handler runs
        let next = rx.lock().await.recv().await;
        let Some(op) = next else {
            break;
        };
        queued.fetch_sub(1, Ordering::Release);

        if op.is_expired() {
            debug!(worker = id, type_id = op.request().type_id, "skipping expired operation");
            op.complete(Completion::Fail(StatusCode::BAD_TIMEOUT));
        } else {
            op.run().await;
        }
    }
}
