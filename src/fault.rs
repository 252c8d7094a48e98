//! Fault construction.
//!
//! [`FaultBuilder`] is the one place where an error becomes a response. The
//! fault has exactly the shape of a success response: a header carrying a
//! bad status, diagnostics trimmed to the caller's mask, and a string table
//! in which every distinct diagnostic string appears once.
//!
//! The full error is always logged, whatever the mask lets onto the wire.
//!
//! # Example
//!
//! ```
//! use ua_dispatch::error::DispatchError;
//! use ua_dispatch::fault::FaultBuilder;
//! use ua_dispatch::protocol::{DiagnosticsMask, RequestHeader};
//! use ua_dispatch::status::StatusCode;
//!
//! let header = RequestHeader::new(42).with_diagnostics(DiagnosticsMask::SERVICE_SYMBOLIC_ID);
//! let fault = FaultBuilder::build(631, Some(&header), &DispatchError::ServiceUnsupported(631));
//!
//! assert_eq!(fault.request_handle(), 42);
//! assert_eq!(fault.service_result(), StatusCode::BAD_SERVICE_UNSUPPORTED);
//! assert_eq!(fault.header.string_table[0], "BadServiceUnsupported");
//! ```

use std::error::Error as _;

use bytes::Bytes;
use tracing::{debug, error, warn};

use crate::codec::STANDARD_NAMESPACE;
use crate::error::{DispatchError, ServiceError};
use crate::protocol::{
    utc_now, DiagnosticInfo, DiagnosticsMask, RequestHeader, ResponseHeader, ServiceResponse,
    StringTable,
};
use crate::status::StatusCode;

/// Locale of the texts this crate writes itself.
const DEFAULT_LOCALE: &str = "en-US";

/// Localized text sent for errors without a recognized status code.
const UNEXPECTED_TEXT: &str = "An unexpected error occurred";

/// Builds fault responses from errors.
pub struct FaultBuilder;

impl FaultBuilder {
    /// Build a fault for `error`.
    ///
    /// `request` is the originating request header, or `None` when the
    /// request could not be decoded. Without a header the handle is 0 and
    /// no diagnostics are returned.
    pub fn build(
        type_id: u32,
        request: Option<&RequestHeader>,
        error: &DispatchError,
    ) -> ServiceResponse {
        let request_handle = request.map_or(0, |h| h.request_handle);
        let mask = request.map_or(DiagnosticsMask::NONE, |h| h.return_diagnostics);

        Self::trace(type_id, request_handle, error);

        let detail = Self::describe(error);
        let mut strings = StringTable::new();
        let diagnostics = Self::diagnostics(&detail, mask, &mut strings);

        let header = ResponseHeader {
            timestamp: utc_now(),
            request_handle,
            service_result: error.status_code(),
            service_diagnostics: diagnostics,
            string_table: strings.into_vec(),
        };
        ServiceResponse::new(type_id, header, Bytes::new())
    }

    /// Build a fault carrying only `status`.
    pub fn from_status(
        type_id: u32,
        request: Option<&RequestHeader>,
        status: StatusCode,
    ) -> ServiceResponse {
        Self::build(type_id, request, &ServiceError::new(status).into())
    }

    fn trace(type_id: u32, request_handle: u32, err: &DispatchError) {
        match err {
            DispatchError::Unexpected(_) | DispatchError::Io(_) | DispatchError::Internal(_) => {
                let mut chain = Vec::new();
                let mut source = err.source();
                while let Some(cause) = source {
                    chain.push(cause.to_string());
                    source = cause.source();
                }
                error!(type_id, request_handle, error = %err, causes = ?chain, "request failed");
            }
            DispatchError::Service(e) => {
                debug!(type_id, request_handle, status = %e.status, error = %err, "service fault");
            }
            _ => {
                warn!(type_id, request_handle, error = %err, "request rejected");
            }
        }
    }

    /// Normalize any error into a [`ServiceError`] description.
    fn describe(err: &DispatchError) -> ServiceError {
        match err {
            DispatchError::Service(e) => e.clone(),
            DispatchError::Unexpected(_) | DispatchError::Io(_) => {
                let mut detail = ServiceError::new(StatusCode::BAD_UNEXPECTED_ERROR)
                    .with_namespace_uri(STANDARD_NAMESPACE)
                    .with_text(DEFAULT_LOCALE, UNEXPECTED_TEXT)
                    .with_additional_info(err.to_string());
                if let Some(cause) = err.source().and_then(|s| s.source()) {
                    detail = detail.with_inner(Self::describe_cause(cause));
                }
                detail
            }
            other => ServiceError::new(other.status_code())
                .with_namespace_uri(STANDARD_NAMESPACE)
                .with_text(DEFAULT_LOCALE, other.to_string()),
        }
    }

    fn describe_cause(cause: &(dyn std::error::Error + 'static)) -> ServiceError {
        let mut detail = ServiceError {
            symbolic_id: None,
            ..ServiceError::new(StatusCode::BAD_UNEXPECTED_ERROR)
        }
        .with_additional_info(cause.to_string());
        if let Some(next) = cause.source() {
            detail = detail.with_inner(Self::describe_cause(next));
        }
        detail
    }

    /// Project `detail` through `mask`, interning strings into `strings`.
    fn diagnostics(
        detail: &ServiceError,
        mask: DiagnosticsMask,
        strings: &mut StringTable,
    ) -> Option<DiagnosticInfo> {
        if !mask.wants_service_diagnostics() {
            return None;
        }

        let mut info = DiagnosticInfo::default();

        if mask.contains(DiagnosticsMask::SERVICE_SYMBOLIC_ID) {
            if let Some(symbolic_id) = &detail.symbolic_id {
                info.symbolic_id = Some(strings.intern(symbolic_id));
                let namespace = detail.namespace_uri.as_deref().unwrap_or(STANDARD_NAMESPACE);
                info.namespace_uri = Some(strings.intern(namespace));
            }
        }

        if mask.contains(DiagnosticsMask::SERVICE_LOCALIZED_TEXT) {
            if let Some(text) = &detail.localized_text {
                let locale = detail.locale.as_deref().unwrap_or(DEFAULT_LOCALE);
                info.locale = Some(strings.intern(locale));
                info.localized_text = Some(strings.intern(text));
            }
        }

        if mask.contains(DiagnosticsMask::SERVICE_ADDITIONAL_INFO) {
            info.additional_info = detail.additional_info.clone();
        }

        if let Some(inner) = &detail.inner {
            if mask.contains(DiagnosticsMask::SERVICE_INNER_STATUS_CODE) {
                info.inner_status_code = Some(inner.status);
            }
            if mask.contains(DiagnosticsMask::SERVICE_INNER_DIAGNOSTICS) {
                info.inner_diagnostic_info =
                    Self::diagnostics(inner, mask, strings).map(Box::new);
            }
        }

        if info.is_empty() {
            None
        } else {
            Some(info)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct StorageError {
        cause: std::io::Error,
    }

    impl fmt::Display for StorageError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "history store unavailable")
        }
    }

    impl std::error::Error for StorageError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.cause)
        }
    }

    fn header(handle: u32, mask: DiagnosticsMask) -> RequestHeader {
        RequestHeader::new(handle).with_diagnostics(mask)
    }

    #[test]
    fn test_unsupported_echoes_handle() {
        let fault = FaultBuilder::build(
            9000,
            Some(&header(42, DiagnosticsMask::NONE)),
            &DispatchError::ServiceUnsupported(9000),
        );

        assert_eq!(fault.request_handle(), 42);
        assert_eq!(fault.service_result(), StatusCode::BAD_SERVICE_UNSUPPORTED);
        assert_eq!(fault.type_id, 9000);
        assert!(fault.body.is_empty());
        assert!(fault.is_fault());
    }

    #[test]
    fn test_no_request_means_handle_zero_and_no_diagnostics() {
        let fault = FaultBuilder::build(0, None, &DispatchError::Decoding("bad".to_string()));

        assert_eq!(fault.request_handle(), 0);
        assert_eq!(fault.service_result(), StatusCode::BAD_DECODING_ERROR);
        assert!(fault.header.service_diagnostics.is_none());
        assert!(fault.header.string_table.is_empty());
    }

    #[test]
    fn test_empty_mask_returns_no_diagnostics() {
        let err = ServiceError::new(StatusCode::BAD_TIMEOUT).with_text("en-US", "too slow");
        let fault = FaultBuilder::build(631, Some(&header(1, DiagnosticsMask::NONE)), &err.into());

        assert_eq!(fault.service_result(), StatusCode::BAD_TIMEOUT);
        assert!(fault.header.service_diagnostics.is_none());
        assert!(fault.header.string_table.is_empty());
    }

    #[test]
    fn test_service_error_maps_directly() {
        let err = ServiceError::new(StatusCode::BAD_TOO_MANY_OPERATIONS)
            .with_namespace_uri("urn:plant")
            .with_text("de-DE", "Zu viele Operationen");
        let fault = FaultBuilder::build(
            631,
            Some(&header(3, DiagnosticsMask::SERVICE_SYMBOLIC_ID_AND_TEXT)),
            &err.into(),
        );

        let info = fault.header.service_diagnostics.as_ref().unwrap();
        let table = &fault.header.string_table;
        assert_eq!(fault.service_result(), StatusCode::BAD_TOO_MANY_OPERATIONS);
        assert_eq!(table[info.symbolic_id.unwrap() as usize], "BadTooManyOperations");
        assert_eq!(table[info.namespace_uri.unwrap() as usize], "urn:plant");
        assert_eq!(table[info.locale.unwrap() as usize], "de-DE");
        assert_eq!(table[info.localized_text.unwrap() as usize], "Zu viele Operationen");
    }

    #[test]
    fn test_string_table_deduplicates() {
        // the same namespace on three levels, the same symbolic id on two
        let err = ServiceError::new(StatusCode::BAD_INTERNAL_ERROR)
            .with_symbolic_id("Failure")
            .with_inner(
                ServiceError::new(StatusCode::BAD_INTERNAL_ERROR)
                    .with_symbolic_id("Failure")
                    .with_inner(ServiceError::new(StatusCode::BAD_TIMEOUT)),
            );
        let mask = DiagnosticsMask::SERVICE_SYMBOLIC_ID | DiagnosticsMask::SERVICE_INNER_DIAGNOSTICS;
        let fault = FaultBuilder::build(631, Some(&header(1, mask)), &err.into());

        let table = &fault.header.string_table;
        assert_eq!(
            table,
            &vec![
                "Failure".to_string(),
                STANDARD_NAMESPACE.to_string(),
                "BadTimeout".to_string(),
            ]
        );

        let outer = fault.header.service_diagnostics.as_ref().unwrap();
        let middle = outer.inner_diagnostic_info.as_ref().unwrap();
        let innermost = middle.inner_diagnostic_info.as_ref().unwrap();
        assert_eq!(outer.symbolic_id, Some(0));
        assert_eq!(middle.symbolic_id, Some(0));
        assert_eq!(innermost.symbolic_id, Some(2));
        assert_eq!(outer.namespace_uri, Some(1));
        assert_eq!(middle.namespace_uri, Some(1));
        assert_eq!(innermost.namespace_uri, Some(1));
    }

    #[test]
    fn test_inner_status_code_only_when_requested() {
        let err = ServiceError::new(StatusCode::BAD_INTERNAL_ERROR)
            .with_inner(ServiceError::new(StatusCode::BAD_OUT_OF_MEMORY));

        let with = FaultBuilder::build(
            1,
            Some(&header(1, DiagnosticsMask::SERVICE_INNER_STATUS_CODE)),
            &err.clone().into(),
        );
        let info = with.header.service_diagnostics.unwrap();
        assert_eq!(info.inner_status_code, Some(StatusCode::BAD_OUT_OF_MEMORY));
        assert!(info.inner_diagnostic_info.is_none());

        let without = FaultBuilder::build(
            1,
            Some(&header(1, DiagnosticsMask::SERVICE_SYMBOLIC_ID)),
            &err.into(),
        );
        assert!(without.header.service_diagnostics.unwrap().inner_status_code.is_none());
    }

    #[test]
    fn test_unexpected_error_is_generic_on_the_wire() {
        let err = DispatchError::unexpected(StorageError {
            cause: std::io::Error::new(std::io::ErrorKind::NotFound, "segment 17 missing"),
        });
        let fault = FaultBuilder::build(
            664,
            Some(&header(5, DiagnosticsMask::SERVICE_LOCALIZED_TEXT)),
            &err,
        );

        let info = fault.header.service_diagnostics.as_ref().unwrap();
        assert_eq!(fault.service_result(), StatusCode::BAD_UNEXPECTED_ERROR);
        assert_eq!(
            fault.header.string_table[info.localized_text.unwrap() as usize],
            UNEXPECTED_TEXT
        );
        assert!(info.additional_info.is_none());
    }

    #[test]
    fn test_unexpected_error_message_in_additional_info() {
        let err = DispatchError::unexpected(StorageError {
            cause: std::io::Error::new(std::io::ErrorKind::NotFound, "segment 17 missing"),
        });
        let mask = DiagnosticsMask::SERVICE_ADDITIONAL_INFO | DiagnosticsMask::SERVICE_INNER_DIAGNOSTICS;
        let fault = FaultBuilder::build(664, Some(&header(5, mask)), &err);

        let info = fault.header.service_diagnostics.unwrap();
        assert_eq!(
            info.additional_info.as_deref(),
            Some("Unexpected error: history store unavailable")
        );
        let inner = info.inner_diagnostic_info.unwrap();
        assert_eq!(inner.additional_info.as_deref(), Some("segment 17 missing"));
        assert!(fault.header.string_table.is_empty());
    }

    #[test]
    fn test_from_status() {
        let fault = FaultBuilder::from_status(
            631,
            Some(&header(8, DiagnosticsMask::SERVICE_SYMBOLIC_ID)),
            StatusCode::BAD_TOO_MANY_OPERATIONS,
        );
        assert_eq!(fault.service_result(), StatusCode::BAD_TOO_MANY_OPERATIONS);
        assert_eq!(fault.request_handle(), 8);
        assert_eq!(fault.header.string_table[0], "BadTooManyOperations");
    }
}
