//! Message context: the type/namespace tables used at the wire boundary.
//!
//! Decoding an inbound envelope consults the context's type table; a type
//! id the context has never heard of is a decoding failure, not a routing
//! miss. Encoding writes the response envelope through the same
//! [`MsgPackCodec`] path for success and fault alike.

use std::collections::HashMap;

use bytes::Bytes;

use super::MsgPackCodec;
use crate::error::{DispatchError, Result, ServiceError};
use crate::protocol::{
    build_frame, flags, Header, RequestMessage, RequestMessageRef, ResponseMessage,
    ResponseMessageRef, ServiceRequest, ServiceResponse, DEFAULT_MAX_MESSAGE_SIZE, HEADER_SIZE,
};
use crate::status::StatusCode;

/// Namespace at index 0 of every context.
pub const STANDARD_NAMESPACE: &str = "http://opcfoundation.org/UA/";

/// Binary encoding ids of the standard service requests.
pub mod type_ids {
    pub const FIND_SERVERS_REQUEST: u32 = 422;
    pub const GET_ENDPOINTS_REQUEST: u32 = 428;
    pub const CREATE_SESSION_REQUEST: u32 = 461;
    pub const ACTIVATE_SESSION_REQUEST: u32 = 467;
    pub const CLOSE_SESSION_REQUEST: u32 = 473;
    pub const CANCEL_REQUEST: u32 = 479;
    pub const ADD_NODES_REQUEST: u32 = 488;
    pub const BROWSE_REQUEST: u32 = 527;
    pub const BROWSE_NEXT_REQUEST: u32 = 533;
    pub const TRANSLATE_BROWSE_PATHS_REQUEST: u32 = 554;
    pub const REGISTER_NODES_REQUEST: u32 = 560;
    pub const READ_REQUEST: u32 = 631;
    pub const HISTORY_READ_REQUEST: u32 = 664;
    pub const WRITE_REQUEST: u32 = 673;
    pub const CALL_REQUEST: u32 = 712;
    pub const CREATE_MONITORED_ITEMS_REQUEST: u32 = 751;
    pub const CREATE_SUBSCRIPTION_REQUEST: u32 = 787;
    pub const PUBLISH_REQUEST: u32 = 826;
    pub const REPUBLISH_REQUEST: u32 = 832;
    pub const DELETE_SUBSCRIPTIONS_REQUEST: u32 = 847;
}

const STANDARD_TYPES: &[(u32, &str)] = &[
    (type_ids::FIND_SERVERS_REQUEST, "FindServersRequest"),
    (type_ids::GET_ENDPOINTS_REQUEST, "GetEndpointsRequest"),
    (type_ids::CREATE_SESSION_REQUEST, "CreateSessionRequest"),
    (type_ids::ACTIVATE_SESSION_REQUEST, "ActivateSessionRequest"),
    (type_ids::CLOSE_SESSION_REQUEST, "CloseSessionRequest"),
    (type_ids::CANCEL_REQUEST, "CancelRequest"),
    (type_ids::ADD_NODES_REQUEST, "AddNodesRequest"),
    (type_ids::BROWSE_REQUEST, "BrowseRequest"),
    (type_ids::BROWSE_NEXT_REQUEST, "BrowseNextRequest"),
    (
        type_ids::TRANSLATE_BROWSE_PATHS_REQUEST,
        "TranslateBrowsePathsToNodeIdsRequest",
    ),
    (type_ids::REGISTER_NODES_REQUEST, "RegisterNodesRequest"),
    (type_ids::READ_REQUEST, "ReadRequest"),
    (type_ids::HISTORY_READ_REQUEST, "HistoryReadRequest"),
    (type_ids::WRITE_REQUEST, "WriteRequest"),
    (type_ids::CALL_REQUEST, "CallRequest"),
    (
        type_ids::CREATE_MONITORED_ITEMS_REQUEST,
        "CreateMonitoredItemsRequest",
    ),
    (type_ids::CREATE_SUBSCRIPTION_REQUEST, "CreateSubscriptionRequest"),
    (type_ids::PUBLISH_REQUEST, "PublishRequest"),
    (type_ids::REPUBLISH_REQUEST, "RepublishRequest"),
    (type_ids::DELETE_SUBSCRIPTIONS_REQUEST, "DeleteSubscriptionsRequest"),
];

/// Entry in the type table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub name: String,
    pub namespace_index: u16,
}

/// Type and namespace tables plus encoding limits.
#[derive(Debug, Clone)]
pub struct MessageContext {
    namespaces: Vec<String>,
    types: HashMap<u32, TypeInfo>,
    max_message_size: u32,
}

impl MessageContext {
    /// Empty context: standard namespace only, no types.
    pub fn new() -> Self {
        Self {
            namespaces: vec![STANDARD_NAMESPACE.to_string()],
            types: HashMap::new(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Context knowing every standard service request.
    pub fn standard() -> Self {
        let mut ctx = Self::new();
        for &(id, name) in STANDARD_TYPES {
            ctx.register_type(id, name, 0);
        }
        ctx
    }

    /// Context used to encode faults when no typed request exists.
    pub fn fallback() -> Self {
        Self::new()
    }

    pub fn with_max_message_size(mut self, max_message_size: u32) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    #[inline]
    pub fn max_message_size(&self) -> u32 {
        self.max_message_size
    }

    /// Add a namespace URI, returning its index. Existing URIs keep theirs.
    pub fn add_namespace(&mut self, uri: &str) -> u16 {
        if let Some(idx) = self.namespace_index(uri) {
            return idx;
        }
        self.namespaces.push(uri.to_string());
        (self.namespaces.len() - 1) as u16
    }

    pub fn namespace_index(&self, uri: &str) -> Option<u16> {
        self.namespaces
            .iter()
            .position(|ns| ns == uri)
            .map(|idx| idx as u16)
    }

    pub fn namespace_uri(&self, idx: u16) -> Option<&str> {
        self.namespaces.get(idx as usize).map(String::as_str)
    }

    /// Add or replace a type table entry.
    pub fn register_type(&mut self, type_id: u32, name: &str, namespace_index: u16) {
        self.types.insert(
            type_id,
            TypeInfo {
                name: name.to_string(),
                namespace_index,
            },
        );
    }

    pub fn type_info(&self, type_id: u32) -> Option<&TypeInfo> {
        self.types.get(&type_id)
    }

    #[inline]
    pub fn knows_type(&self, type_id: u32) -> bool {
        self.types.contains_key(&type_id)
    }

    /// Decode an inbound request envelope.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Decoding`] for any malformed or unknown
    /// payload.
    pub fn decode_request(&self, bytes: &[u8]) -> Result<ServiceRequest> {
        let header = Header::decode(bytes).ok_or_else(|| {
            DispatchError::Decoding(format!(
                "Message of {} bytes is shorter than the {} byte header",
                bytes.len(),
                HEADER_SIZE
            ))
        })?;
        header.validate_request(self.max_message_size)?;

        let body = &bytes[HEADER_SIZE..];
        if body.len() != header.body_length as usize {
            return Err(DispatchError::Decoding(format!(
                "Body length {} does not match header length {}",
                body.len(),
                header.body_length
            )));
        }

        if !self.knows_type(header.type_id) {
            return Err(DispatchError::Decoding(format!(
                "Unknown type id {}",
                header.type_id
            )));
        }

        let message: RequestMessage = MsgPackCodec::decode(body)?;
        Ok(ServiceRequest::new(
            header.type_id,
            message.header,
            Bytes::from(message.body),
        ))
    }

    /// Encode a request envelope (client side of the boundary).
    pub fn encode_request(&self, request: &ServiceRequest, channel_id: u32) -> Result<Bytes> {
        let body = MsgPackCodec::encode(&RequestMessageRef {
            header: &request.header,
            body: &request.body,
        })?;
        self.check_size(&body, StatusCode::BAD_REQUEST_TOO_LARGE)?;
        let header = Header::new(request.type_id, flags::REQUEST, channel_id, 0);
        Ok(build_frame(&header, &body))
    }

    /// Encode a response or fault envelope.
    ///
    /// # Errors
    ///
    /// Returns a `BadResponseTooLarge` service error when the body exceeds
    /// the context's maximum message size.
    pub fn encode_response(&self, response: &ServiceResponse, channel_id: u32) -> Result<Bytes> {
        let body = MsgPackCodec::encode(&ResponseMessageRef {
            header: &response.header,
            body: &response.body,
        })?;
        self.check_size(&body, StatusCode::BAD_RESPONSE_TOO_LARGE)?;
        let header = Header::new(response.type_id, flags::RESPONSE, channel_id, 0);
        Ok(build_frame(&header, &body))
    }

    /// Decode a response envelope, returning its header and message.
    pub fn decode_response(&self, bytes: &[u8]) -> Result<(Header, ServiceResponse)> {
        let header = Header::decode(bytes)
            .ok_or_else(|| DispatchError::Decoding("Message shorter than header".to_string()))?;
        if !header.is_response() {
            return Err(DispatchError::Decoding(
                "Expected a response, got a request".to_string(),
            ));
        }
        let body = &bytes[HEADER_SIZE..];
        if body.len() != header.body_length as usize {
            return Err(DispatchError::Decoding(format!(
                "Body length {} does not match header length {}",
                body.len(),
                header.body_length
            )));
        }
        let message: ResponseMessage = MsgPackCodec::decode(body)?;
        let response = ServiceResponse::new(header.type_id, message.header, Bytes::from(message.body));
        Ok((header, response))
    }

    fn check_size(&self, body: &[u8], status: StatusCode) -> Result<()> {
        if body.len() > self.max_message_size as usize {
            return Err(ServiceError::new(status)
                .with_additional_info(format!(
                    "Body size {} exceeds maximum {}",
                    body.len(),
                    self.max_message_size
                ))
                .into());
        }
        Ok(())
    }
}

impl Default for MessageContext {
    fn default() -> Self {
        Self::standard()
    }
}
