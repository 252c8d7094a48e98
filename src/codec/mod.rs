//! Codec module - serialization at the wire boundary.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (struct-as-map)
//! - [`MessageContext`] - type/namespace tables and envelope encode/decode
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects.
//! The message context is plain data: it is built once, shared read-only
//! behind an `Arc`, and parameterizes every decode and encode.
//!
//! # Example
//!
//! ```
//! use ua_dispatch::codec::{type_ids, MessageContext};
//! use ua_dispatch::protocol::{RequestHeader, ServiceRequest};
//!
//! let ctx = MessageContext::standard();
//! let request = ServiceRequest::with_body(type_ids::READ_REQUEST, RequestHeader::new(1), &()).unwrap();
//! let bytes = ctx.encode_request(&request, 4).unwrap();
//! assert_eq!(ctx.decode_request(&bytes).unwrap().type_id, type_ids::READ_REQUEST);
//! ```

mod message_context;
mod msgpack;

pub use message_context::{type_ids, MessageContext, TypeInfo, STANDARD_NAMESPACE};
pub use msgpack::MsgPackCodec;
