//! # ua-dispatch
//!
//! Request-dispatch core for a secure-channel protocol server endpoint.
//!
//! A request arrives over a secure channel, encoded or already decoded. The
//! dispatcher resolves the handler registered for its type, invokes it
//! inline or through an external scheduler, and turns the outcome into a
//! response. Failures become faults with the same envelope as a success,
//! so the wire boundary always sees a well-formed message.
//!
//! ## Architecture
//!
//! - **Registry**: type id → handler, filled once at startup
//! - **Channel context**: task-local, visible to the handler across awaits
//! - **Bridge**: pending operation + waiter for scheduled invocation
//! - **Faults**: one builder, diagnostics trimmed to the caller's mask
//!
//! ## Example
//!
//! ```
//! use ua_dispatch::channel::{EndpointDescription, SecureChannelContext};
//! use ua_dispatch::codec::type_ids;
//! use ua_dispatch::protocol::{RequestHeader, ServiceRequest};
//! use ua_dispatch::{DispatchError, RequestDispatcher};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), DispatchError> {
//! let dispatcher = RequestDispatcher::builder()
//!     .service(type_ids::READ_REQUEST, "ReadRequest", |nodes: Vec<String>, _ctx| async move {
//!         Ok::<_, DispatchError>(vec![0.0f64; nodes.len()])
//!     })
//!     .build()?;
//!
//! let request = ServiceRequest::with_body(type_ids::READ_REQUEST, RequestHeader::new(1), &["i=2258"])?;
//! let channel = SecureChannelContext::new(7, EndpointDescription::new("opc.tcp://localhost:4840"));
//! let response = dispatcher.dispatch(request, channel).await;
//!
//! assert!(!response.is_fault());
//! assert_eq!(response.decode_body::<Vec<f64>>()?, vec![0.0]);
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod fault;
pub mod handler;
pub mod protocol;
pub mod status;
pub mod telemetry;

mod dispatcher;

pub use bridge::{Completion, PendingOperation, Scheduler, WorkerPoolScheduler};
pub use channel::SecureChannelContext;
pub use config::DispatcherConfig;
pub use dispatcher::{DispatcherBuilder, RequestDispatcher};
pub use error::{DispatchError, ServiceError};
pub use fault::FaultBuilder;
pub use handler::{RequestContext, ServiceRegistry};
pub use status::StatusCode;
