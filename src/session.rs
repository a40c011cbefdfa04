//! Live roast session state

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::info;

use crate::types::{LoopState, RoastEvent, RoastPhase, Sample};
use crate::{Result, RoasterError};

/// Trend bookkeeping used by phase detection.
#[derive(Debug, Clone, Default)]
pub(crate) struct TrendState {
    /// Last sample whose temperature differed from its predecessor
    pub reference: Option<Sample>,
    /// Sample preceding the current run of sharp falls
    pub run_start: Option<Sample>,
    pub sharp_falls: u32,
    /// Lowest sample since charge
    pub minimum: Option<Sample>,
    pub rises: u32,
}

/// One monitored roast attempt.
///
/// Exactly one session is live per polling thread. Starting a new roast
/// clears every derived event; phases only move forward
/// (`Idle → Roasting → Cooling → Idle`).
#[derive(Debug, Clone)]
pub struct RoastSession {
    phase: RoastPhase,
    roast_started: Option<Instant>,
    cooling_started: Option<Instant>,
    charge: Option<RoastEvent>,
    turning_point: Option<RoastEvent>,
    history: VecDeque<Sample>,
    history_len: usize,
    /// Every sample of the current roast
    log: Vec<Sample>,
    pub(crate) trend: TrendState,
}

/// Serializable summary of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: RoastPhase,
    pub charge: Option<RoastEvent>,
    pub turning_point: Option<RoastEvent>,
    pub rate_of_rise: Option<f64>,
}

impl RoastSession {
    /// Fresh idle session keeping up to `history_len` samples.
    pub fn new(history_len: usize) -> Self {
        Self {
            phase: RoastPhase::Idle,
            roast_started: None,
            cooling_started: None,
            charge: None,
            turning_point: None,
            history: VecDeque::with_capacity(history_len),
            history_len: history_len.max(2),
            log: Vec::new(),
            trend: TrendState::default(),
        }
    }

    pub fn phase(&self) -> RoastPhase {
        self.phase
    }

    pub fn charge(&self) -> Option<&RoastEvent> {
        self.charge.as_ref()
    }

    pub fn turning_point(&self) -> Option<&RoastEvent> {
        self.turning_point.as_ref()
    }

    /// `Idle → Roasting`. Clears events, history and trend state.
    pub fn begin_roast(&mut self, now: Instant) -> Result<()> {
        self.expect_phase("start a roast", RoastPhase::Idle)?;
        self.phase = RoastPhase::Roasting;
        self.roast_started = Some(now);
        self.cooling_started = None;
        self.charge = None;
        self.turning_point = None;
        self.history.clear();
        self.log.clear();
        self.trend = TrendState::default();
        info!("Roast started");
        Ok(())
    }

    /// `Roasting → Cooling`.
    pub fn begin_cooling(&mut self, now: Instant) -> Result<()> {
        self.expect_phase("stop the roast", RoastPhase::Roasting)?;
        self.phase = RoastPhase::Cooling;
        self.cooling_started = Some(now);
        info!(elapsed = ?self.elapsed(now), "Roast stopped, cooling");
        Ok(())
    }

    /// `Cooling → Idle`. Events stay readable until the next roast starts.
    pub fn finish_cooling(&mut self) -> Result<()> {
        self.expect_phase("finish cooling", RoastPhase::Cooling)?;
        self.phase = RoastPhase::Idle;
        self.roast_started = None;
        self.cooling_started = None;
        info!("Cooling finished");
        Ok(())
    }

    /// Time on the roast clock, while roasting or cooling.
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.roast_started.map(|started| now.saturating_duration_since(started))
    }

    /// Time spent cooling so far.
    pub fn cooling_elapsed(&self, now: Instant) -> Option<Duration> {
        self.cooling_started.map(|started| now.saturating_duration_since(started))
    }

    /// Append to the rolling window, dropping the oldest sample when full.
    /// The roast log keeps every sample.
    pub fn record(&mut self, sample: Sample) {
        if self.history.len() == self.history_len {
            self.history.pop_front();
        }
        self.history.push_back(sample);
        self.log.push(sample);
    }

    /// Every sample recorded since the roast started, oldest first.
    pub fn roast_log(&self) -> &[Sample] {
        &self.log
    }

    /// Samples in the rolling window, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &Sample> {
        self.history.iter()
    }

    /// Bean temperature change in °C per minute across the window.
    pub fn rate_of_rise(&self) -> Option<f64> {
        let first = self.history.front()?;
        let last = self.history.back()?;
        let span = last.elapsed.checked_sub(first.elapsed)?;
        if span.is_zero() {
            return None;
        }
        Some((last.bean_temp - first.bean_temp) * 60.0 / span.as_secs_f64())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            charge: self.charge,
            turning_point: self.turning_point,
            rate_of_rise: self.rate_of_rise(),
        }
    }

    pub(crate) fn set_charge(&mut self, event: RoastEvent) {
        self.charge.get_or_insert(event);
    }

    pub(crate) fn set_turning_point(&mut self, event: RoastEvent) {
        self.turning_point.get_or_insert(event);
    }

    fn expect_phase(&self, operation: &'static str, expected: RoastPhase) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(RoasterError::invalid_state(operation, LoopState::Polling(self.phase)))
        }
    }
}
