//! Endpoint and encoding descriptions attached to a secure channel.

use serde::{Deserialize, Serialize};

/// URI of the unsecured security policy.
pub const SECURITY_POLICY_NONE: &str = "http://opcfoundation.org/UA/SecurityPolicy#None";

/// Message protection applied on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSecurityMode {
    #[default]
    None,
    Sign,
    SignAndEncrypt,
}

/// Wire encoding negotiated for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageEncoding {
    #[default]
    Binary,
    Json,
}

/// The endpoint a channel was opened against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescription {
    pub endpoint_url: String,
    pub security_policy_uri: String,
    pub security_mode: MessageSecurityMode,
}

impl EndpointDescription {
    /// Unsecured endpoint at `endpoint_url`.
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            security_policy_uri: SECURITY_POLICY_NONE.to_string(),
            security_mode: MessageSecurityMode::None,
        }
    }

    pub fn with_security(
        mut self,
        policy_uri: impl Into<String>,
        mode: MessageSecurityMode,
    ) -> Self {
        self.security_policy_uri = policy_uri.into();
        self.security_mode = mode;
        self
    }

    /// True when messages are at least signed.
    pub fn is_secure(&self) -> bool {
        self.security_mode != MessageSecurityMode::None
    }
}
