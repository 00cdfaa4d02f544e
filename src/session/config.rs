use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::store::PostProcessingKind;

/// Configuration for a recording session controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Duration of each segment before rotating recorders
    /// Default: 300 seconds (5 minutes)
    pub rotation_interval: Duration,

    /// How long `stop()` waits for the recorder to quiesce before finalizing anyway
    /// Default: 2.5 seconds
    pub fallback_timeout: Duration,

    /// Attempts per upload or metadata write
    pub max_attempts: u32,

    /// Backoff before the first retry; doubles on every further retry
    pub base_delay: Duration,

    /// File extension of stored parts (e.g. "webm", "wav")
    pub segment_extension: String,

    /// Jobs enqueued once a session finishes cleanly
    pub post_processing: Vec<PostProcessingKind>,
}

impl RecorderConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.base_delay)
    }

    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.rotation_interval.is_zero(),
            "rotation interval must be greater than zero"
        );
        ensure!(
            !self.fallback_timeout.is_zero(),
            "fallback timeout must be greater than zero"
        );
        ensure!(self.max_attempts > 0, "max attempts must be at least 1");
        ensure!(
            !self.segment_extension.is_empty()
                && self.segment_extension.bytes().all(|b| b.is_ascii_alphanumeric()),
            "segment extension must be alphanumeric, got {:?}",
            self.segment_extension
        );
        Ok(())
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            rotation_interval: Duration::from_secs(300), // 5 minutes
            fallback_timeout: Duration::from_millis(2500),
            max_attempts: retry.max_attempts,
            base_delay: retry.base_delay,
            segment_extension: "webm".to_string(),
            post_processing: vec![PostProcessingKind::Compile],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RecorderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rotation_interval, Duration::from_secs(300));
        assert_eq!(config.retry_policy().max_attempts, 3);
    }

    #[test]
    fn test_validate_rejects_unusable_settings() {
        let zero_rotation = RecorderConfig {
            rotation_interval: Duration::ZERO,
            ..RecorderConfig::default()
        };
        assert!(zero_rotation.validate().is_err());

        let dotted_extension = RecorderConfig {
            segment_extension: "../webm".to_string(),
            ..RecorderConfig::default()
        };
        assert!(dotted_extension.validate().is_err());

        let no_attempts = RecorderConfig {
            max_attempts: 0,
            ..RecorderConfig::default()
        };
        assert!(no_attempts.validate().is_err());
    }
}
