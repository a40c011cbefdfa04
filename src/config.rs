//! Engine configuration.
//!
//! Every field has a default matching the Hottop KN-8828B, so an empty
//! document is a valid configuration. Configurations can be written by hand
//! in YAML:
//!
//! ```rust
//! use hottop::RoasterConfig;
//!
//! let config = RoasterConfig::from_yaml_str(
//!     r#"
//! polling:
//!   interval_ms: 250
//! detection:
//!   charge_min_drop: 25.0
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.polling.interval_ms, 250);
//! assert_eq!(config.retry.max_attempts, 3);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::{Result, RoasterError};

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoasterConfig {
    pub serial: SerialConfig,
    pub polling: PollingConfig,
    pub retry: RetryPolicy,
    pub detection: DetectionConfig,
}

/// Serial line parameters. Framing is always 8N1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialConfig {
    pub baud_rate: u32,
    /// Ceiling for a single read or write
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self { baud_rate: 115_200, timeout_ms: 1_000 }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Polling cadence and session parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollingConfig {
    pub interval_ms: u64,
    /// How long the cooling cycle runs before motors return to idle
    pub cooling_secs: u64,
    /// Command frames written before the first exchange to wake the roaster
    pub wake_up_frames: u32,
    /// Samples kept in the session's rolling window
    pub history_len: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: 500, cooling_secs: 240, wake_up_frames: 2, history_len: 8 }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn cooling(&self) -> Duration {
        Duration::from_secs(self.cooling_secs)
    }
}

/// Retry and reconnect bounds for one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Reads per exchange before falling back to the cache
    pub max_attempts: u32,
    /// Consecutive exhausted exchanges before the line is reopened
    pub reconnect_after: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, reconnect_after: 5 }
    }
}

/// Thresholds for charge and turning point detection.
///
/// These are calibration values, not physical constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionConfig {
    /// Smallest single-step fall (°C) that counts toward a charge drop
    pub charge_step_drop: f64,
    /// Consecutive sharp falls needed to confirm a charge
    pub charge_confirm_steps: u32,
    /// Smallest total fall (°C) across the charge run
    pub charge_min_drop: f64,
    /// Charge is only searched this long after roast start
    pub charge_search_secs: u64,
    /// Consecutive rises after the post-charge minimum needed to confirm it
    pub turning_confirm_steps: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            charge_step_drop: 8.0,
            charge_confirm_steps: 2,
            charge_min_drop: 20.0,
            charge_search_secs: 300,
            turning_confirm_steps: 2,
        }
    }
}

impl DetectionConfig {
    pub fn charge_search(&self) -> Duration {
        Duration::from_secs(self.charge_search_secs)
    }
}

impl RoasterConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml).map_err(|e| RoasterError::Parse {
            context: "roaster configuration".to_string(),
            details: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading roaster configuration from {}", path.display());
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| RoasterError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    /// Reject values that would stall or spin the polling loop.
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_ms == 0 {
            return Err(RoasterError::config("polling.interval_ms must be positive"));
        }
        if self.polling.history_len < 2 {
            return Err(RoasterError::config("polling.history_len must be at least 2"));
        }
        if self.serial.timeout_ms == 0 {
            return Err(RoasterError::config("serial.timeout_ms must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(RoasterError::config("retry.max_attempts must be positive"));
        }
        if self.retry.reconnect_after == 0 {
            return Err(RoasterError::config("retry.reconnect_after must be positive"));
        }

        let detection = &self.detection;
        if detection.charge_confirm_steps == 0 || detection.turning_confirm_steps == 0 {
            return Err(RoasterError::config("detection confirm steps must be positive"));
        }
        if !(detection.charge_step_drop > 0.0 && detection.charge_min_drop > 0.0) {
            return Err(RoasterError::config("detection drops must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn empty_document_yields_defaults() -> Result<()> {
        let config = RoasterConfig::from_yaml_str("{}").context("empty mapping")?;
        assert_eq!(config, RoasterConfig::default());
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.polling.interval(), Duration::from_millis(500));
        Ok(())
    }

    #[test]
    fn partial_sections_keep_other_defaults() -> Result<()> {
        let config = RoasterConfig::from_yaml_str(
            "retry:\n  max_attempts: 5\nserial:\n  timeout_ms: 250\n",
        )
        .context("partial config")?;

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.reconnect_after, 5);
        assert_eq!(config.serial.timeout(), Duration::from_millis(250));
        assert_eq!(config.detection, DetectionConfig::default());
        Ok(())
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let err = RoasterConfig::from_yaml_str("polling:\n  intervl_ms: 100\n").unwrap_err();
        assert!(matches!(err, RoasterError::Parse { .. }), "got {err:?}");
    }

    #[test]
    fn zero_bounds_are_rejected() {
        let mut config = RoasterConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(RoasterError::Config { .. })));

        let mut config = RoasterConfig::default();
        config.polling.interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = RoasterConfig::default();
        config.detection.turning_confirm_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_a_file_error() {
        let err = RoasterConfig::from_path("/definitely/not/here/roaster.yaml").unwrap_err();
        assert!(matches!(err, RoasterError::File { .. }));
        assert!(!err.is_retryable());
    }
}
