//! Test utilities shared by unit tests and benchmarks
//!
//! Frame and reading builders, plus reference temperature curves for phase
//! detection.

#![cfg(any(test, feature = "benchmark"))]

use std::time::Duration;

use crate::protocol::{FRAME_LEN, status_frame};
use crate::types::{Freshness, Reading, RoastSettings, Sample};

/// Bean temperatures (°C) of the reference charge scenario.
pub const CHARGE_CURVE: [f64; 9] = [200.0, 200.0, 195.0, 180.0, 160.0, 150.0, 152.0, 158.0, 165.0];

/// Valid status frame with baseline settings and the given bean temperature.
pub fn status_bytes(bean_celsius: u16) -> [u8; FRAME_LEN] {
    status_frame(&RoastSettings::baseline(), bean_celsius, bean_celsius, true)
}

/// Fresh reading with baseline settings.
pub fn reading_at(bean_temp: f64) -> Reading {
    Reading {
        bean_temp,
        env_temp: bean_temp,
        settings: RoastSettings::baseline(),
        chaff_tray: true,
        valid: true,
        freshness: Freshness::Fresh,
    }
}

/// Samples at a fixed cadence starting at zero.
pub fn samples_every(cadence: Duration, temps: &[f64]) -> Vec<Sample> {
    temps.iter().enumerate().map(|(i, &t)| Sample::new(cadence * i as u32, t)).collect()
}

/// A plausible full roast: preheat plateau, charge drop, recovery and climb.
pub fn roast_curve() -> Vec<f64> {
    let mut temps = vec![210.0; 5];
    temps.extend([195.0, 175.0, 155.0, 138.0, 126.0, 120.0, 117.0]);
    temps.extend((1..=40).map(|i| 117.0 + f64::from(i) * 2.5));
    temps
}
