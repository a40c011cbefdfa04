//! Per-tick results published to subscribers

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::{Reading, RoastEvent, RoastPhase, RoastSettings};
use crate::error::TransportError;

/// Composite result of one completed poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickResult {
    /// Monotonic tick counter since monitoring started
    pub tick: u64,

    pub reading: Reading,

    /// Phase after this tick's commands were applied
    pub phase: RoastPhase,

    /// Settings actually written in this tick's command frame
    pub sent: RoastSettings,

    /// Time since roast start, while a roast is in progress or cooling
    pub elapsed: Option<Duration>,

    /// Bean temperature rate of rise in °C/min over the recent window
    pub rate_of_rise: Option<f64>,

    /// Event recorded during this tick, if any
    pub event: Option<RoastEvent>,
}

/// Item delivered to subscribers.
#[derive(Debug, Clone)]
pub enum RoasterUpdate {
    Tick(Arc<TickResult>),

    /// The loop stopped because the connection was lost.
    Fault(Arc<TransportError>),
}
