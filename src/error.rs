//! Error types for ua-dispatch.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::status::StatusCode;

/// Boxed error used for failures without a recognized status code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for all dispatch operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is registered for the request type.
    #[error("Service unsupported for request type {0}")]
    ServiceUnsupported(u32),

    /// A handler is already registered for the request type.
    #[error("Service already registered for request type {0}")]
    DuplicateService(u32),

    /// Malformed or unrecognized payload.
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// A response could not be encoded.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Missing ambient state or collaborator.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed JSON configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A bounded wait elapsed before completion.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Typed protocol error raised by a handler.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Any other failure. The message is kept for operators.
    #[error("Unexpected error: {0}")]
    Unexpected(#[source] BoxError),

    /// I/O error surfaced by a handler.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    /// Wrap an arbitrary error as [`DispatchError::Unexpected`].
    pub fn unexpected<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Unexpected(err.into())
    }

    /// Status code reported on the wire for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ServiceUnsupported(_) => StatusCode::BAD_SERVICE_UNSUPPORTED,
            Self::Decoding(_) => StatusCode::BAD_DECODING_ERROR,
            Self::Encoding(_) => StatusCode::BAD_ENCODING_ERROR,
            Self::Internal(_)
            | Self::DuplicateService(_)
            | Self::Config(_)
            | Self::Json(_) => StatusCode::BAD_INTERNAL_ERROR,
            Self::Timeout(_) => StatusCode::BAD_TIMEOUT,
            Self::Service(e) => e.status,
            Self::Unexpected(_) | Self::Io(_) => StatusCode::BAD_UNEXPECTED_ERROR,
        }
    }
}

impl From<rmp_serde::decode::Error> for DispatchError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Decoding(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for DispatchError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

/// Result type alias using DispatchError.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// A protocol error carrying its own status code and diagnostics.
///
/// Handlers return this (via `?` into [`DispatchError::Service`]) when a
/// request fails for a reason the client is meant to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub status: StatusCode,
    pub symbolic_id: Option<String>,
    pub namespace_uri: Option<String>,
    pub locale: Option<String>,
    pub localized_text: Option<String>,
    pub additional_info: Option<String>,
    pub inner: Option<Box<ServiceError>>,
}

impl ServiceError {
    /// Create an error carrying only a status. The symbolic id defaults to
    /// the status name when the code is well known.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            symbolic_id: status.name().map(str::to_string),
            namespace_uri: None,
            locale: None,
            localized_text: None,
            additional_info: None,
            inner: None,
        }
    }

    pub fn with_symbolic_id(mut self, symbolic_id: impl Into<String>) -> Self {
        self.symbolic_id = Some(symbolic_id.into());
        self
    }

    pub fn with_namespace_uri(mut self, namespace_uri: impl Into<String>) -> Self {
        self.namespace_uri = Some(namespace_uri.into());
        self
    }

    pub fn with_text(mut self, locale: impl Into<String>, text: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self.localized_text = Some(text.into());
        self
    }

    pub fn with_additional_info(mut self, info: impl Into<String>) -> Self {
        self.additional_info = Some(info.into());
        self
    }

    pub fn with_inner(mut self, inner: ServiceError) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)?;
        if let Some(text) = &self.localized_text {
            write!(f, ": {}", text)?;
        }
        Ok(())
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            DispatchError::ServiceUnsupported(7).status_code(),
            StatusCode::BAD_SERVICE_UNSUPPORTED
        );
        assert_eq!(
            DispatchError::Timeout(Duration::from_millis(5)).status_code(),
            StatusCode::BAD_TIMEOUT
        );
        assert_eq!(
            DispatchError::unexpected("boom").status_code(),
            StatusCode::BAD_UNEXPECTED_ERROR
        );
    }

    #[test]
    fn test_service_error_keeps_its_status() {
        let err: DispatchError = ServiceError::new(StatusCode::BAD_TOO_MANY_OPERATIONS).into();
        assert_eq!(err.status_code(), StatusCode::BAD_TOO_MANY_OPERATIONS);
    }

    #[test]
    fn test_service_error_default_symbolic_id() {
        let err = ServiceError::new(StatusCode::BAD_TIMEOUT);
        assert_eq!(err.symbolic_id.as_deref(), Some("BadTimeout"));

        let custom = ServiceError::new(StatusCode(0x8123_0000));
        assert!(custom.symbolic_id.is_none());
    }

    #[test]
    fn test_decode_error_conversion() {
        let bad: std::result::Result<u32, _> = rmp_serde::from_slice::<u32>(b"\xc1");
        let err: DispatchError = bad.unwrap_err().into();
        assert!(matches!(err, DispatchError::Decoding(_)));
    }
}
