//! Request context for handlers.
//!
//! Every handler receives a [`RequestContext`] alongside its decoded body.
//! It carries the request type, the request header, and the secure channel
//! the call arrived on. The same channel is also reachable through
//! [`SecureChannelContext::current`] for code that has no context in hand.
//!
//! # Example
//!
//! ```ignore
//! async fn create_session(req: CreateSession, ctx: RequestContext) -> Result<SessionCreated> {
//!     // bind the new session to the channel it was created on
//!     let channel_id = ctx.channel().channel_id();
//!     sessions.create(req, channel_id).await
//! }
//! ```

use std::sync::Arc;

use crate::channel::SecureChannelContext;
use crate::protocol::{DiagnosticsMask, RequestHeader};

/// Context passed to service handlers.
///
/// `RequestContext` is `Clone` and cheap to move into spawned work: the
/// channel is shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request type identifier.
    type_id: u32,
    /// Header of the request being serviced.
    header: RequestHeader,
    /// Channel the request arrived on.
    channel: Arc<SecureChannelContext>,
}

impl RequestContext {
    pub fn new(type_id: u32, header: RequestHeader, channel: Arc<SecureChannelContext>) -> Self {
        Self {
            type_id,
            header,
            channel,
        }
    }

    #[inline]
    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    #[inline]
    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    #[inline]
    pub fn request_handle(&self) -> u32 {
        self.header.request_handle
    }

    #[inline]
    pub fn return_diagnostics(&self) -> DiagnosticsMask {
        self.header.return_diagnostics
    }

    #[inline]
    pub fn channel(&self) -> &Arc<SecureChannelContext> {
        &self.channel
    }
}
