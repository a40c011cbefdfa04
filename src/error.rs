//! Error types for roaster control.
//!
//! Errors are layered the same way the engine is:
//!
//! - [`FrameError`]: a single inbound frame failed validation. Local to the
//!   retry ladder and never seen by the polling loop.
//! - [`TransportError`]: the outcome of a whole exchange. `NoData` skips a
//!   tick, `ConnectionLost` ends the polling session.
//! - [`SettingsError`]: a control value was rejected at the mutation
//!   boundary, before it could reach the polling thread.
//! - [`RoasterError`]: everything a caller of the public API can see.
//!
//! ```rust
//! use hottop::{RoasterError, SettingsError};
//!
//! let error: RoasterError = SettingsError::out_of_range("heater", 140, 100).into();
//! assert!(!error.is_retryable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::types::LoopState;

/// Result type alias for roaster operations.
pub type Result<T, E = RoasterError> = std::result::Result<T, E>;

/// Why an inbound frame was rejected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidFrame {
    #[error("expected {expected} bytes, found {found}")]
    Length { expected: usize, found: usize },

    #[error("bad marker {found:02X?}")]
    Marker { found: [u8; 2] },

    #[error("checksum mismatch: computed {computed:#04x}, received {received:#04x}")]
    Checksum { computed: u8, received: u8 },

    #[error("implausible {sensor} temperature {celsius}°C")]
    Temperature { sensor: &'static str, celsius: u16 },
}

/// Frame validation failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid frame: {0}")]
    Invalid(InvalidFrame),
}

impl From<InvalidFrame> for FrameError {
    fn from(reason: InvalidFrame) -> Self {
        FrameError::Invalid(reason)
    }
}

/// Outcome of a failed exchange with the roaster.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// Every read attempt failed and no known-good reading is cached yet.
    #[error("No valid frame received and no cached reading available")]
    NoData,

    /// The serial line could not be reopened after repeated failures.
    #[error("Connection to roaster lost: {reason}")]
    ConnectionLost {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl TransportError {
    /// Helper constructor for a lost connection.
    pub fn connection_lost(reason: impl Into<String>, source: Option<std::io::Error>) -> Self {
        TransportError::ConnectionLost { reason: reason.into(), source }
    }

    /// Whether the polling session must end.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportError::ConnectionLost { .. })
    }
}

/// Rejected control value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{field} must be between 0 and {max}, got {value}")]
    OutOfRange { field: &'static str, value: u16, max: u16 },
}

impl SettingsError {
    /// Helper constructor for out-of-range values.
    pub fn out_of_range(field: &'static str, value: u16, max: u16) -> Self {
        SettingsError::OutOfRange { field, value, max }
    }
}

/// Main error type for the public control API.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RoasterError {
    #[error("Failed to open roaster connection: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("Cannot {operation} while {state}")]
    InvalidState { operation: &'static str, state: LoopState },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Configuration file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Polling thread failed: {reason}")]
    Worker { reason: String },
}

impl RoasterError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RoasterError::Connection { .. } => true,
            RoasterError::Transport(TransportError::NoData) => true,
            RoasterError::Transport(TransportError::ConnectionLost { .. }) => true,
            RoasterError::InvalidState { .. } => true,
            RoasterError::Worker { .. } => true,
            RoasterError::Settings(_) => false,
            RoasterError::Config { .. } => false,
            RoasterError::File { .. } => false,
            RoasterError::Parse { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RoasterError::Connection { .. } => vec![
                "Check the USB serial adapter is plugged in",
                "Verify the port path and user permissions",
                "Make sure no other program holds the port",
            ],
            RoasterError::Transport(TransportError::NoData) => vec![
                "Wait for the roaster to finish waking up",
                "Check the serial cable for loose contacts",
            ],
            RoasterError::Transport(TransportError::ConnectionLost { .. }) => vec![
                "Power-cycle the roaster",
                "Reconnect the USB serial adapter",
                "Call start_monitoring again once the port is back",
            ],
            RoasterError::Settings(_) => vec!["Pass a percentage between 0 and 100"],
            RoasterError::InvalidState { .. } => vec![
                "Start monitoring before starting a roast",
                "Stop the current roast before starting another",
            ],
            RoasterError::Config { .. } => vec![
                "Use non-zero intervals and retry bounds",
                "Compare against RoasterConfig::default()",
            ],
            RoasterError::File { .. } => {
                vec!["Check the configuration file exists and is readable"]
            }
            RoasterError::Parse { .. } => vec![
                "Check the YAML syntax of the configuration file",
                "Remove unknown keys from the configuration",
            ],
            RoasterError::Worker { .. } => {
                vec!["Restart monitoring", "Report the panic with the log output"]
            }
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        RoasterError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        RoasterError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        RoasterError::Config { reason: reason.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        RoasterError::File { path, source }
    }

    /// Helper constructor for state machine violations.
    pub fn invalid_state(operation: &'static str, state: LoopState) -> Self {
        RoasterError::InvalidState { operation, state }
    }
}
