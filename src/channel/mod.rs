//! Channel module - secure channel identity for the call in flight.
//!
//! Provides:
//! - [`SecureChannelContext`] - channel id, endpoint, and encoding
//! - [`scope`] - binds a context to the current task for one call
//! - [`EndpointDescription`] - endpoint URL and security settings

mod context;
mod endpoint;

pub use context::{scope, SecureChannelContext};
pub use endpoint::{EndpointDescription, MessageEncoding, MessageSecurityMode, SECURITY_POLICY_NONE};
