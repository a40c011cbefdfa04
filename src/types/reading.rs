//! Decoded device status

use serde::Serialize;

use super::RoastSettings;

/// Whether a reading came from the current exchange or the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Freshness {
    /// Decoded from a frame received during this exchange.
    #[default]
    Fresh,

    /// Repeat of the last good reading after `cycles` failed exchanges in a row.
    Stale { cycles: u32 },
}

/// Structured view of a validated inbound frame.
///
/// Readings are immutable; the next one supersedes them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    /// Bean sensor temperature in °C
    pub bean_temp: f64,

    /// Environment (drum air) temperature in °C
    pub env_temp: f64,

    /// Control state the roaster reports back
    pub settings: RoastSettings,

    /// Whether the chaff tray is seated
    pub chaff_tray: bool,

    /// Always true for readings produced by the codec
    pub valid: bool,

    pub freshness: Freshness,
}

impl Reading {
    pub fn bean_temp_fahrenheit(&self) -> f64 {
        celsius_to_fahrenheit(self.bean_temp)
    }

    pub fn env_temp_fahrenheit(&self) -> f64 {
        celsius_to_fahrenheit(self.env_temp)
    }

    pub fn is_stale(&self) -> bool {
        matches!(self.freshness, Freshness::Stale { .. })
    }

    /// Copy of this reading marked as a cached repeat.
    pub(crate) fn as_stale(&self, cycles: u32) -> Self {
        Self { freshness: Freshness::Stale { cycles }, ..*self }
    }
}

/// Convert a temperature from °C to °F.
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 1.8 + 32.0
}
