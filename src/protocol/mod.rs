//! Protocol module - envelope header, messages, and diagnostics.
//!
//! This module defines what crosses the wire boundary:
//! - 13-byte envelope header encoding/decoding
//! - Request/response envelopes with their headers
//! - Diagnostics mask, diagnostic info, and the per-fault string table

mod diagnostics;
mod message;
mod wire_format;

pub use diagnostics::{DiagnosticInfo, DiagnosticsMask, StringTable};
pub use message::{utc_now, RequestHeader, ResponseHeader, ServiceRequest, ServiceResponse};
pub(crate) use message::{RequestMessage, RequestMessageRef, ResponseMessage, ResponseMessageRef};
pub use wire_format::{build_frame, flags, Header, DEFAULT_MAX_MESSAGE_SIZE, HEADER_SIZE, RESERVED_TYPE_ID};
