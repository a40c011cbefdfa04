//! Roast phases, loop states and derived roast events

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Phase of the live roast session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum RoastPhase {
    #[default]
    Idle,
    Roasting,
    Cooling,
}

impl fmt::Display for RoastPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoastPhase::Idle => f.write_str("idle"),
            RoastPhase::Roasting => f.write_str("roasting"),
            RoastPhase::Cooling => f.write_str("cooling"),
        }
    }
}

/// State of the polling engine as seen from outside.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum LoopState {
    #[default]
    Stopped,
    Polling(RoastPhase),
}

impl LoopState {
    pub fn is_polling(&self) -> bool {
        matches!(self, LoopState::Polling(_))
    }

    /// Roast phase, if polling.
    pub fn phase(&self) -> Option<RoastPhase> {
        match self {
            LoopState::Stopped => None,
            LoopState::Polling(phase) => Some(*phase),
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Stopped => f.write_str("stopped"),
            LoopState::Polling(phase) => write!(f, "polling ({})", phase),
        }
    }
}

/// Kind of milestone derived from the temperature stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    /// Beans loaded into the pre-heated drum.
    Charge,
    /// Thermal minimum after charge.
    TurningPoint,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Charge => f.write_str("charge"),
            EventKind::TurningPoint => f.write_str("turning point"),
        }
    }
}

/// A recorded roast milestone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoastEvent {
    pub kind: EventKind,
    /// Time since roast start
    pub elapsed: Duration,
    /// Bean temperature in °C
    pub temperature: f64,
}

/// One bean-temperature observation on the roast clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub elapsed: Duration,
    pub bean_temp: f64,
}

impl Sample {
    pub fn new(elapsed: Duration, bean_temp: f64) -> Self {
        Self { elapsed, bean_temp }
    }

    pub(crate) fn into_event(self, kind: EventKind) -> RoastEvent {
        RoastEvent { kind, elapsed: self.elapsed, temperature: self.bean_temp }
    }
}
