//! Request and response envelopes.
//!
//! A [`ServiceRequest`] is the typed form the dispatcher routes: a decoded
//! header plus a service body that the handler decodes into its own type.
//! A [`ServiceResponse`] has the same shape whether it reports success or a
//! fault; only `header.service_result` tells them apart.
//!
//! # Example
//!
//! ```
//! use ua_dispatch::protocol::{RequestHeader, ServiceRequest};
//!
//! let header = RequestHeader::new(42);
//! let request = ServiceRequest::with_body(631, header, &vec![1u32, 2, 3]).unwrap();
//! let body: Vec<u32> = request.decode_body().unwrap();
//! assert_eq!(body, vec![1, 2, 3]);
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::diagnostics::{DiagnosticInfo, DiagnosticsMask};
use crate::codec::MsgPackCodec;
use crate::error::Result;
use crate::status::StatusCode;

/// 100 ns ticks between 1601-01-01 and 1970-01-01.
const TICKS_TO_UNIX_EPOCH: i64 = 116_444_736_000_000_000;

/// Current time as 100 ns ticks since 1601-01-01 UTC.
pub fn utc_now() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => TICKS_TO_UNIX_EPOCH + (elapsed.as_nanos() / 100) as i64,
        Err(_) => TICKS_TO_UNIX_EPOCH,
    }
}

/// Header common to every service request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Client-assigned handle, echoed in the response.
    pub request_handle: u32,
    /// Requested diagnostics verbosity.
    pub return_diagnostics: DiagnosticsMask,
    /// Milliseconds the client is willing to wait (0 = no hint).
    pub timeout_hint: u32,
    /// Client send time.
    pub timestamp: i64,
    pub audit_entry_id: Option<String>,
}

impl RequestHeader {
    pub fn new(request_handle: u32) -> Self {
        Self {
            request_handle,
            timestamp: utc_now(),
            ..Default::default()
        }
    }

    pub fn with_diagnostics(mut self, mask: DiagnosticsMask) -> Self {
        self.return_diagnostics = mask;
        self
    }

    pub fn with_timeout_hint(mut self, timeout_ms: u32) -> Self {
        self.timeout_hint = timeout_ms;
        self
    }
}

/// Header common to every service response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub timestamp: i64,
    /// Handle of the originating request (0 if unknown).
    pub request_handle: u32,
    pub service_result: StatusCode,
    pub service_diagnostics: Option<DiagnosticInfo>,
    pub string_table: Vec<String>,
}

impl ResponseHeader {
    /// Good header echoing `request`'s handle.
    pub fn good(request: &RequestHeader) -> Self {
        Self {
            timestamp: utc_now(),
            request_handle: request.request_handle,
            ..Default::default()
        }
    }
}

/// A decoded service request.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    /// Request type identifier used for routing.
    pub type_id: u32,
    pub header: RequestHeader,
    /// MessagePack-encoded service body.
    pub body: Bytes,
}

impl ServiceRequest {
    pub fn new(type_id: u32, header: RequestHeader, body: Bytes) -> Self {
        Self {
            type_id,
            header,
            body,
        }
    }

    /// Build a request by encoding `body` with MsgPack.
    pub fn with_body<T: Serialize>(type_id: u32, header: RequestHeader, body: &T) -> Result<Self> {
        let data = MsgPackCodec::encode(body)?;
        Ok(Self::new(type_id, header, Bytes::from(data)))
    }

    /// Decode the service body.
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T> {
        MsgPackCodec::decode(&self.body)
    }
}

/// A service response or fault.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResponse {
    /// Type identifier of the request this answers.
    pub type_id: u32,
    pub header: ResponseHeader,
    /// MessagePack-encoded service body (empty for faults).
    pub body: Bytes,
}

impl ServiceResponse {
    pub fn new(type_id: u32, header: ResponseHeader, body: Bytes) -> Self {
        Self {
            type_id,
            header,
            body,
        }
    }

    /// Good response to `request` carrying `body` encoded with MsgPack.
    pub fn with_body<T: Serialize>(request: &ServiceRequest, body: &T) -> Result<Self> {
        let data = MsgPackCodec::encode(body)?;
        Ok(Self::new(
            request.type_id,
            ResponseHeader::good(&request.header),
            Bytes::from(data),
        ))
    }

    /// True when the service result is not good.
    #[inline]
    pub fn is_fault(&self) -> bool {
        !self.header.service_result.is_good()
    }

    #[inline]
    pub fn service_result(&self) -> StatusCode {
        self.header.service_result
    }

    #[inline]
    pub fn request_handle(&self) -> u32 {
        self.header.request_handle
    }

    /// Decode the service body.
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T> {
        MsgPackCodec::decode(&self.body)
    }
}

/// Borrowed request body for encoding.
#[derive(Serialize)]
pub(crate) struct RequestMessageRef<'a> {
    pub header: &'a RequestHeader,
    #[serde(with = "serde_bytes")]
    pub body: &'a [u8],
}

/// Owned request body for decoding.
#[derive(Deserialize)]
pub(crate) struct RequestMessage {
    pub header: RequestHeader,
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
}

/// Borrowed response body for encoding.
#[derive(Serialize)]
pub(crate) struct ResponseMessageRef<'a> {
    pub header: &'a ResponseHeader,
    #[serde(with = "serde_bytes")]
    pub body: &'a [u8],
}

/// Owned response body for decoding.
#[derive(Deserialize)]
pub(crate) struct ResponseMessage {
    pub header: ResponseHeader,
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
}
