//! Dispatcher configuration.
//!
//! Every field has a default, so a JSON document only needs the keys it
//! overrides:
//!
//! ```
//! use ua_dispatch::config::DispatcherConfig;
//!
//! let config = DispatcherConfig::from_json(r#"{ "default_timeout_ms": 2500 }"#).unwrap();
//! assert_eq!(config.default_timeout_ms, 2500);
//! assert_eq!(config.scheduler_workers, 4);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use crate::error::{DispatchError, Result};
use crate::protocol::{DEFAULT_MAX_MESSAGE_SIZE, HEADER_SIZE};

/// Wait applied when a request carries no timeout hint.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Upper bound on any client-supplied timeout hint.
pub const DEFAULT_MAX_TIMEOUT_MS: u64 = 600_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Wait used for scheduled requests whose timeout hint is 0.
    pub default_timeout_ms: u64,
    /// Clamp for timeout hints.
    pub max_timeout_ms: u64,
    /// Largest accepted or produced message body, in bytes.
    pub max_message_size: u32,
    /// Worker tasks for the built-in worker pool.
    pub scheduler_workers: usize,
    /// Queue slots for the built-in worker pool.
    pub scheduler_queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_timeout_ms: DEFAULT_MAX_TIMEOUT_MS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            scheduler_workers: DEFAULT_WORKERS,
            scheduler_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl DispatcherConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the dispatcher cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_ms == 0 {
            return Err(DispatchError::Config(
                "default_timeout_ms must be positive".into(),
            ));
        }
        if self.max_timeout_ms < self.default_timeout_ms {
            return Err(DispatchError::Config(format!(
                "max_timeout_ms {} is below default_timeout_ms {}",
                self.max_timeout_ms, self.default_timeout_ms
            )));
        }
        if (self.max_message_size as usize) < HEADER_SIZE {
            return Err(DispatchError::Config(format!(
                "max_message_size {} cannot hold a header",
                self.max_message_size
            )));
        }
        if self.scheduler_workers == 0 || self.scheduler_queue_capacity == 0 {
            return Err(DispatchError::Config(
                "scheduler_workers and scheduler_queue_capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    #[inline]
    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }

    /// Effective wait for a request's timeout hint, in milliseconds.
    ///
    /// A hint of 0 means "no preference" and selects the default.
    pub fn timeout_for_hint(&self, timeout_hint_ms: u32) -> Duration {
        match timeout_hint_ms {
            0 => self.default_timeout(),
            hint => Duration::from_millis(u64::from(hint)).min(self.max_timeout()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DispatcherConfig::default();
        config.validate().unwrap();
        assert_eq!(config.default_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            DispatcherConfig::from_json(r#"{ "scheduler_workers": 8, "max_timeout_ms": 30000 }"#)
                .unwrap();
        assert_eq!(config.scheduler_workers, 8);
        assert_eq!(config.max_timeout_ms, 30_000);
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
    }

    #[test]
    fn test_malformed_json() {
        let err = DispatcherConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, DispatchError::Json(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = DispatcherConfig::from_json(r#"{ "scheduler_queue_capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));

        let err = DispatcherConfig::from_json(r#"{ "max_message_size": 4 }"#).unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));

        let err =
            DispatcherConfig::from_json(r#"{ "default_timeout_ms": 5000, "max_timeout_ms": 100 }"#)
                .unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }

    #[test]
    fn test_timeout_for_hint() {
        let config = DispatcherConfig {
            default_timeout_ms: 1_000,
            max_timeout_ms: 5_000,
            ..Default::default()
        };
        assert_eq!(config.timeout_for_hint(0), Duration::from_secs(1));
        assert_eq!(config.timeout_for_hint(250), Duration::from_millis(250));
        assert_eq!(config.timeout_for_hint(60_000), Duration::from_secs(5));
    }
}
