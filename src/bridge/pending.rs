//! Single-shot completion of a scheduled request.
//!
//! [`PendingOperation::new`] splits a scheduled request into two halves:
//!
//! ```text
//!             PendingOperation ──► Scheduler ──► complete(Completion)
//!                    │                                   │
//! Dispatcher ────────┤                          oneshot  │
//!                    │                                   ▼
//!             CompletionWaiter ──► wait_for_complete(deadline)
//! ```
//!
//! The producer half is consumed by `complete`, the consumer half by
//! `wait_for_complete`, so each side acts at most once. The oneshot channel
//! is the only edge between them: the result becomes visible to the waiter
//! exactly when the completion publishes it.
//!
//! States: `Created → Queued → Completed`, or `Created → Queued → TimedOut`
//! when the waiter gives up first. A timeout abandons the wait, never the
//! work; a completion that arrives afterwards is discarded.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::channel::SecureChannelContext;
use crate::error::{DispatchError, Result, ServiceError};
use crate::handler::{invoke, Handler, HandlerResult};
use crate::protocol::{RequestHeader, ServiceRequest, ServiceResponse};
use crate::status::StatusCode;

/// Lifecycle of a scheduled operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OperationState {
    Created = 0,
    Queued = 1,
    Completed = 2,
    TimedOut = 3,
}

impl OperationState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Queued,
            2 => Self::Completed,
            _ => Self::TimedOut,
        }
    }
}

/// Shared state cell, observed by both halves.
#[derive(Debug, Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(OperationState::Created as u8)))
    }

    fn load(&self) -> OperationState {
        OperationState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `to` unless the state is already terminal. Returns the
    /// state that was replaced, or the terminal state that blocked it.
    fn advance(&self, to: OperationState) -> std::result::Result<OperationState, OperationState> {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let state = OperationState::from_u8(current);
            if matches!(state, OperationState::Completed | OperationState::TimedOut) {
                return Err(state);
            }
            match self.0.compare_exchange_weak(
                current,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(state),
                Err(actual) => current = actual,
            }
        }
    }
}

/// How the scheduler finished an operation.
#[derive(Debug)]
pub enum Completion {
    /// The scheduler produced the response itself.
    Respond(ServiceResponse),
    /// Control is handed back: invoke the resolved handler now.
    Invoke,
    /// The operation failed before dispatch.
    Fail(StatusCode),
}

impl Completion {
    /// Map a legacy `(response, status)` callback onto a completion.
    ///
    /// A response wins over the status; without one, a good status means
    /// [`Completion::Invoke`] and a bad one [`Completion::Fail`].
    pub fn from_callback(response: Option<ServiceResponse>, status: StatusCode) -> Self {
        match response {
            Some(response) => Self::Respond(response),
            None if status.is_good() => Self::Invoke,
            None => Self::Fail(status),
        }
    }
}

/// Publishing end of the completion signal.
struct Publisher {
    tx: oneshot::Sender<HandlerResult>,
    state: StateCell,
    type_id: u32,
    request_handle: u32,
}

impl Publisher {
    fn publish(self, result: HandlerResult) {
        if let Err(state) = self.state.advance(OperationState::Completed) {
            debug!(
                type_id = self.type_id,
                request_handle = self.request_handle,
                ?state,
                "late completion discarded"
            );
            return;
        }
        if self.tx.send(result).is_err() {
            debug!(
                type_id = self.type_id,
                request_handle = self.request_handle,
                "completion discarded, waiter gone"
            );
        }
    }
}

/// Producer half: a queued unit of work awaiting one completion.
pub struct PendingOperation {
    request: ServiceRequest,
    channel: Arc<SecureChannelContext>,
    handler: Arc<dyn Handler>,
    deadline: Instant,
    runtime: Handle,
    publisher: Publisher,
}

impl PendingOperation {
    /// Create an operation and the waiter that observes it.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Internal`] when called outside a tokio
    /// runtime; handler invocation needs one to run on.
    pub fn new(
        request: ServiceRequest,
        channel: Arc<SecureChannelContext>,
        handler: Arc<dyn Handler>,
        deadline: Instant,
    ) -> Result<(Self, CompletionWaiter)> {
        let runtime = Handle::try_current()
            .map_err(|e| DispatchError::Internal(format!("No runtime for scheduled work: {e}")))?;
        let (tx, rx) = oneshot::channel();
        let state = StateCell::new();

        let waiter = CompletionWaiter {
            type_id: request.type_id,
            header: request.header.clone(),
            created: Instant::now(),
            deadline,
            state: state.clone(),
            rx,
        };
        let publisher = Publisher {
            tx,
            state,
            type_id: request.type_id,
            request_handle: request.header.request_handle,
        };
        let op = Self {
            request,
            channel,
            handler,
            deadline,
            runtime,
            publisher,
        };
        Ok((op, waiter))
    }

    #[inline]
    pub fn request(&self) -> &ServiceRequest {
        &self.request
    }

    #[inline]
    pub fn channel(&self) -> &Arc<SecureChannelContext> {
        &self.channel
    }

    #[inline]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// True once the waiter's deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn state(&self) -> OperationState {
        self.publisher.state.load()
    }

    pub(crate) fn mark_queued(&self) {
        let _ = self.publisher.state.advance(OperationState::Queued);
    }

    /// Finish the operation. May be called from any thread.
    ///
    /// [`Completion::Invoke`] spawns the handler on the runtime the
    /// operation was created on; use [`run`](Self::run) to invoke it on the
    /// caller's task instead.
    pub fn complete(self, completion: Completion) {
        match completion {
            Completion::Respond(response) => self.publisher.publish(Ok(response)),
            Completion::Fail(status) => self
                .publisher
                .publish(Err(ServiceError::new(status).into())),
            Completion::Invoke => {
                let runtime = self.runtime.clone();
                runtime.spawn(self.run());
            }
        }
    }

    /// Invoke the handler, wait for it, and publish its outcome.
    ///
    /// The handler runs on its own task; a panic is published as an
    /// unexpected error and does not unwind into the caller.
    pub async fn run(self) {
        let Self {
            request,
            channel,
            handler,
            runtime,
            publisher,
            ..
        } = self;
        let result = invoke(&runtime, handler, request, channel).await;
        publisher.publish(result);
    }
}

impl fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("type_id", &self.request.type_id)
            .field("request_handle", &self.request.header.request_handle)
            .field("channel_id", &self.channel.channel_id())
            .field("deadline", &self.deadline)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Consumer half: a bounded wait on the completion signal.
#[derive(Debug)]
pub struct CompletionWaiter {
    type_id: u32,
    header: RequestHeader,
    created: Instant,
    deadline: Instant,
    state: StateCell,
    rx: oneshot::Receiver<HandlerResult>,
}

impl CompletionWaiter {
    #[inline]
    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    #[inline]
    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    #[inline]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn state(&self) -> OperationState {
        self.state.load()
    }

    /// Wait until the operation's own deadline.
    pub async fn wait(self) -> HandlerResult {
        let deadline = self.deadline;
        self.wait_for_complete(deadline).await
    }

    /// Wait for completion or `deadline`, whichever comes first.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Timeout`] when the deadline elapses first
    /// - [`DispatchError::Internal`] when the operation was dropped uncompleted
    /// - whatever error the completion carried
    pub async fn wait_for_complete(mut self, deadline: Instant) -> HandlerResult {
        match tokio::time::timeout_at(deadline, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(self.dropped()),
            Err(_) => match self.state.advance(OperationState::TimedOut) {
                Ok(_) => Err(DispatchError::Timeout(deadline.saturating_duration_since(self.created))),
                // completed while the timer fired; the send follows the state change
                Err(_) => match (&mut self.rx).await {
                    Ok(result) => result,
                    Err(_) => Err(self.dropped()),
                },
            },
        }
    }

    fn dropped(&self) -> DispatchError {
        DispatchError::Internal(format!(
            "Operation for request {} dropped without completion",
            self.header.request_handle
        ))
    }
}
