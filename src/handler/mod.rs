//! Handler module - service registration and lookup.
//!
//! Provides:
//! - [`ServiceRegistry`] - maps request type IDs to handlers
//! - [`RequestContext`] - what a handler knows about its call
//!
//! # Example
//!
//! ```
//! use ua_dispatch::handler::ServiceRegistry;
//!
//! let mut registry = ServiceRegistry::new();
//!
//! // Typed handler: body decoded for you, return value encoded for you
//! registry
//!     .register(631, "ReadRequest", |node_ids: Vec<String>, ctx| async move {
//!         let _ = ctx.channel().channel_id();
//!         Ok(vec![0.0f64; node_ids.len()])
//!     })
//!     .unwrap();
//!
//! // Raw handler: full control over the response header
//! registry
//!     .register_raw(673, "WriteRequest", |request, _ctx| async move {
//!         ua_dispatch::protocol::ServiceResponse::with_body(&request, &())
//!     })
//!     .unwrap();
//! ```

mod context;
mod registry;

pub use context::RequestContext;
pub(crate) use registry::invoke;
pub use registry::{
    BoxFuture, Handler, HandlerResult, RawHandler, ServiceDescriptor, ServiceRegistry,
    TypedHandler,
};
