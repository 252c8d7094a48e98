//! Diagnostics carried in response headers.
//!
//! A client asks for diagnostics with a [`DiagnosticsMask`] in its request
//! header. The server answers with a [`DiagnosticInfo`] whose string fields
//! are indices into the response's string table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::status::StatusCode;

/// Caller-requested diagnostics verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagnosticsMask(pub u32);

impl DiagnosticsMask {
    pub const NONE: DiagnosticsMask = DiagnosticsMask(0);
    pub const SERVICE_SYMBOLIC_ID: DiagnosticsMask = DiagnosticsMask(0x0001);
    pub const SERVICE_LOCALIZED_TEXT: DiagnosticsMask = DiagnosticsMask(0x0002);
    pub const SERVICE_ADDITIONAL_INFO: DiagnosticsMask = DiagnosticsMask(0x0004);
    pub const SERVICE_INNER_STATUS_CODE: DiagnosticsMask = DiagnosticsMask(0x0008);
    pub const SERVICE_INNER_DIAGNOSTICS: DiagnosticsMask = DiagnosticsMask(0x0010);
    pub const SERVICE_SYMBOLIC_ID_AND_TEXT: DiagnosticsMask = DiagnosticsMask(0x0003);
    /// Every service-level bit.
    pub const SERVICE_ALL: DiagnosticsMask = DiagnosticsMask(0x001F);
    /// Every defined bit, service and operation level.
    pub const ALL: DiagnosticsMask = DiagnosticsMask(0x03FF);

    /// True when every bit of `other` is set in `self`.
    #[inline]
    pub fn contains(self, other: DiagnosticsMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any service-level bit is set.
    #[inline]
    pub fn wants_service_diagnostics(self) -> bool {
        self.0 & Self::SERVICE_ALL.0 != 0
    }
}

impl std::ops::BitOr for DiagnosticsMask {
    type Output = DiagnosticsMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        DiagnosticsMask(self.0 | rhs.0)
    }
}

/// Structured diagnostics. String fields are string-table indices.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiagnosticInfo {
    pub symbolic_id: Option<i32>,
    pub namespace_uri: Option<i32>,
    pub locale: Option<i32>,
    pub localized_text: Option<i32>,
    pub additional_info: Option<String>,
    pub inner_status_code: Option<StatusCode>,
    pub inner_diagnostic_info: Option<Box<DiagnosticInfo>>,
}

impl DiagnosticInfo {
    /// True when no field is populated.
    pub fn is_empty(&self) -> bool {
        self == &DiagnosticInfo::default()
    }
}

/// Deduplicating table of diagnostic strings.
///
/// Each distinct string is stored once, in first-insertion order; the index
/// returned by [`StringTable::intern`] stays valid for the table's lifetime.
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    strings: Vec<String>,
    index: HashMap<String, i32>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the index of `value`, inserting it on first sight.
    pub fn intern(&mut self, value: &str) -> i32 {
        if let Some(&idx) = self.index.get(value) {
            return idx;
        }
        let idx = self.strings.len() as i32;
        self.strings.push(value.to_string());
        self.index.insert(value.to_string(), idx);
        idx
    }

    /// Look up a string by index.
    pub fn get(&self, idx: i32) -> Option<&str> {
        usize::try_from(idx)
            .ok()
            .and_then(|i| self.strings.get(i))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Consume the table, yielding strings in index order.
    pub fn into_vec(self) -> Vec<String> {
        self.strings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_contains() {
        let mask = DiagnosticsMask::SERVICE_SYMBOLIC_ID_AND_TEXT;
        assert!(mask.contains(DiagnosticsMask::SERVICE_SYMBOLIC_ID));
        assert!(mask.contains(DiagnosticsMask::SERVICE_LOCALIZED_TEXT));
        assert!(!mask.contains(DiagnosticsMask::SERVICE_ADDITIONAL_INFO));
        assert!(mask.wants_service_diagnostics());
        assert!(!DiagnosticsMask::NONE.wants_service_diagnostics());
    }

    #[test]
    fn test_operation_bits_are_not_service_bits() {
        assert!(!DiagnosticsMask(0x0020).wants_service_diagnostics());
    }

    #[test]
    fn test_intern_deduplicates() {
        let mut table = StringTable::new();
        let first = table.intern("BadTimeout");
        let second = table.intern("http://opcfoundation.org/UA/");
        let again = table.intern("BadTimeout");

        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert_eq!(again, first);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1), Some("http://opcfoundation.org/UA/"));
        assert_eq!(table.get(-1), None);
        assert_eq!(table.get(2), None);
    }

    #[test]
    fn test_into_vec_preserves_insertion_order() {
        let mut table = StringTable::new();
        table.intern("b");
        table.intern("a");
        table.intern("b");
        assert_eq!(table.into_vec(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_empty_diagnostic_info() {
        assert!(DiagnosticInfo::default().is_empty());
        let info = DiagnosticInfo {
            symbolic_id: Some(0),
            ..Default::default()
        };
        assert!(!info.is_empty());
    }
}
