//! Call-scoped secure channel context.
//!
//! The dispatcher runs every handler inside [`scope`], which binds the
//! inbound call's [`SecureChannelContext`] to the current tokio task.
//! Anything on that call chain can read it back with
//! [`SecureChannelContext::current`], including code that resumes after an
//! `.await`. A task-local is used rather than a thread-local: tasks migrate
//! between worker threads, and two requests sharing a thread must never see
//! each other's channel.
//!
//! # Example
//!
//! ```
//! use ua_dispatch::channel::{scope, EndpointDescription, SecureChannelContext};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let ctx = SecureChannelContext::new(7, EndpointDescription::new("opc.tcp://localhost:4840"));
//!
//! assert!(SecureChannelContext::current().is_none());
//! scope(ctx, async {
//!     assert_eq!(SecureChannelContext::current().unwrap().channel_id(), 7);
//! })
//! .await;
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use super::endpoint::{EndpointDescription, MessageEncoding};
use crate::error::{DispatchError, Result};

tokio::task_local! {
    static CURRENT_CHANNEL: Arc<SecureChannelContext>;
}

/// Identity of the channel a request arrived on.
///
/// Read-only once created. Cheap to share: the dispatcher hands out
/// `Arc<SecureChannelContext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureChannelContext {
    channel_id: u32,
    endpoint: EndpointDescription,
    encoding: MessageEncoding,
}

impl SecureChannelContext {
    /// Context for a binary-encoded channel.
    pub fn new(channel_id: u32, endpoint: EndpointDescription) -> Self {
        Self {
            channel_id,
            endpoint,
            encoding: MessageEncoding::Binary,
        }
    }

    pub fn with_encoding(mut self, encoding: MessageEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    #[inline]
    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    #[inline]
    pub fn endpoint(&self) -> &EndpointDescription {
        &self.endpoint
    }

    #[inline]
    pub fn encoding(&self) -> MessageEncoding {
        self.encoding
    }

    /// Context of the call in flight on this task, if any.
    pub fn current() -> Option<Arc<SecureChannelContext>> {
        CURRENT_CHANNEL.try_with(Arc::clone).ok()
    }

    /// Like [`current`](Self::current), but a missing context is an error.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Internal`] when called outside a dispatch.
    pub fn require_current() -> Result<Arc<SecureChannelContext>> {
        Self::current()
            .ok_or_else(|| DispatchError::Internal("No secure channel context in scope".to_string()))
    }
}

/// Run `fut` with `ctx` as the current channel context.
///
/// Scopes nest: an inner scope shadows the outer one until it ends.
pub async fn scope<F>(ctx: impl Into<Arc<SecureChannelContext>>, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_CHANNEL.scope(ctx.into(), fut).await
}
