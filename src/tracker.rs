//! Charge and turning point detection from the bean temperature stream
//!
//! Detection is a heuristic over successive samples:
//!
//! - **Charge**: the first run of `charge_confirm_steps` consecutive falls,
//!   each at least `charge_step_drop`, that adds up to `charge_min_drop`.
//!   Recorded at the sample where the run started.
//! - **Turning point**: after charge, the lowest sample once
//!   `turning_confirm_steps` consecutive rises follow it.
//!
//! Repeated identical temperatures carry no trend information (a stale
//! cached reading looks exactly like that) and are skipped entirely.

use tracing::{debug, info};

use crate::config::DetectionConfig;
use crate::session::RoastSession;
use crate::types::{EventKind, RoastEvent, RoastPhase, Sample};

/// Stateless detector; all trend state lives in the [`RoastSession`].
#[derive(Debug, Clone, Default)]
pub struct RoastPhaseTracker {
    config: DetectionConfig,
}

impl RoastPhaseTracker {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Evaluate `sample` against the session's trend.
    ///
    /// Returns the event recorded by this sample, if any. Nothing is
    /// evaluated unless the session is roasting, and each event is recorded
    /// at most once per session.
    pub fn observe(&self, session: &mut RoastSession, sample: Sample) -> Option<RoastEvent> {
        if session.phase() != RoastPhase::Roasting {
            return None;
        }

        let previous = match session.trend.reference {
            Some(previous) => previous,
            None => {
                session.trend.reference = Some(sample);
                return None;
            }
        };

        let delta = sample.bean_temp - previous.bean_temp;
        if delta.abs() < f64::EPSILON {
            return None;
        }
        session.trend.reference = Some(sample);

        if session.charge().is_none() {
            self.track_charge(session, previous, sample, delta)
        } else if session.turning_point().is_none() {
            self.track_turning_point(session, sample, delta)
        } else {
            None
        }
    }

    fn track_charge(
        &self,
        session: &mut RoastSession,
        previous: Sample,
        sample: Sample,
        delta: f64,
    ) -> Option<RoastEvent> {
        if sample.elapsed > self.config.charge_search() {
            return None;
        }

        let trend = &mut session.trend;
        if -delta < self.config.charge_step_drop {
            trend.run_start = None;
            trend.sharp_falls = 0;
            return None;
        }

        let start = *trend.run_start.get_or_insert(previous);
        trend.sharp_falls += 1;
        debug!(falls = trend.sharp_falls, from = start.bean_temp, to = sample.bean_temp, "Falling");

        let total_drop = start.bean_temp - sample.bean_temp;
        if trend.sharp_falls < self.config.charge_confirm_steps
            || total_drop < self.config.charge_min_drop
        {
            return None;
        }

        trend.minimum = Some(sample);
        trend.rises = 0;

        let event = start.into_event(EventKind::Charge);
        info!(elapsed = ?event.elapsed, temperature = event.temperature, "Charge detected");
        session.set_charge(event);
        Some(event)
    }

    fn track_turning_point(
        &self,
        session: &mut RoastSession,
        sample: Sample,
        delta: f64,
    ) -> Option<RoastEvent> {
        let trend = &mut session.trend;
        let minimum = *trend.minimum.get_or_insert(sample);

        if delta < 0.0 {
            if sample.bean_temp < minimum.bean_temp {
                trend.minimum = Some(sample);
            }
            trend.rises = 0;
            return None;
        }

        trend.rises += 1;
        if trend.rises < self.config.turning_confirm_steps {
            return None;
        }

        let event = minimum.into_event(EventKind::TurningPoint);
        info!(elapsed = ?event.elapsed, temperature = event.temperature, "Turning point detected");
        session.set_turning_point(event);
        Some(event)
    }
}
