//! Control handle for a monitored roaster

use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RoasterConfig;
use crate::driver::{Command, PollingLoop, Shared};
use crate::error::{SettingsError, TransportError};
use crate::link::Link;
use crate::links::SerialLink;
use crate::types::{
    LoopState, Reading, RoastPhase, RoastSettings, RoasterUpdate, Sample, TickResult,
};
use crate::{Result, RoasterError};

/// Buffered updates per subscriber before it starts lagging
const UPDATE_CAPACITY: usize = 64;

struct Worker {
    handle: JoinHandle<Box<dyn Link>>,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
}

/// Handle to one roaster.
///
/// Owns the link while stopped and lends it to the polling thread while
/// monitoring. Settings changes are validated here and take effect on the
/// next tick.
///
/// ```rust,no_run
/// use futures::StreamExt;
/// use hottop::{Roaster, RoasterConfig, RoasterUpdate};
///
/// # async fn run() -> hottop::Result<()> {
/// let mut roaster = Roaster::open("/dev/ttyUSB0", RoasterConfig::default())?;
/// let mut updates = Box::pin(roaster.subscribe());
///
/// roaster.start_monitoring()?;
/// roaster.start_roast()?;
/// roaster.set_heater(80)?;
///
/// while let Some(update) = updates.next().await {
///     match update {
///         RoasterUpdate::Tick(tick) => println!("{:.1} °C", tick.reading.bean_temp),
///         RoasterUpdate::Fault(e) => {
///             eprintln!("connection lost: {e}");
///             break;
///         }
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct Roaster {
    config: RoasterConfig,
    shared: Shared,
    link: Option<Box<dyn Link>>,
    seed: Option<Reading>,
    worker: Option<Worker>,
}

impl Roaster {
    /// Wrap an already opened link.
    pub fn new<L: Link>(link: L, config: RoasterConfig) -> Result<Self> {
        config.validate()?;
        let shared = Shared::new(UPDATE_CAPACITY, config.polling.interval());
        Ok(Self {
            config,
            shared,
            link: Some(Box::new(link)),
            seed: None,
            worker: None,
        })
    }

    /// Open the serial port at `path`.
    pub fn open(path: impl Into<String>, config: RoasterConfig) -> Result<Self> {
        config.validate()?;
        let link = SerialLink::open(path, &config.serial)?;
        Self::new(link, config)
    }

    /// Seed the transport cache used when monitoring next starts.
    pub fn with_cached_reading(mut self, reading: Reading) -> Self {
        self.seed = Some(reading);
        self
    }

    pub fn config(&self) -> &RoasterConfig {
        &self.config
    }

    /// Start the polling thread.
    ///
    /// Motors and solenoid are switched off; heater and fan levels are kept.
    /// After a lost connection the link is reopened first.
    pub fn start_monitoring(&mut self) -> Result<()> {
        let state = self.state();
        if state.is_polling() {
            return Err(RoasterError::invalid_state("start monitoring", state));
        }

        self.reclaim_link()?;
        let mut link = self
            .link
            .take()
            .ok_or_else(|| RoasterError::Worker { reason: "link is unavailable".to_string() })?;

        if self.shared.fault.borrow().is_some() {
            info!("Reopening {} after lost connection", link.describe());
            if let Err(e) = link.reopen() {
                let reason = format!("could not reopen {}", link.describe());
                self.link = Some(link);
                return Err(RoasterError::connection_failed_with_source(reason, Box::new(e)));
            }
            self.shared.fault.send_replace(None);
        }

        self.shared.settings.send_modify(|settings| *settings = settings.for_monitoring());
        self.shared.latest.send_replace(None);
        self.shared.state.send_replace(LoopState::Polling(RoastPhase::Idle));

        let (commands, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let polling = PollingLoop::new(
            link,
            &self.config,
            self.seed.take(),
            self.shared.clone(),
            rx,
            cancel.clone(),
        );

        let handle = thread::Builder::new()
            .name("hottop-poll".to_string())
            .spawn(move || polling.run())
            .map_err(|e| {
                self.shared.state.send_replace(LoopState::Stopped);
                RoasterError::Worker { reason: format!("failed to spawn polling thread: {e}") }
            })?;

        self.worker = Some(Worker { handle, commands, cancel });
        info!("Monitoring started");
        Ok(())
    }

    /// `Idle → Roasting`. Resets every setting to the baseline first.
    pub fn start_roast(&self) -> Result<()> {
        self.transition("start a roast", RoastPhase::Idle, RoastPhase::Roasting)?;
        self.shared.settings.send_replace(RoastSettings::baseline());
        self.send(Command::StartRoast)
    }

    /// `Roasting → Cooling`. Drum and cooling motor run until cooling ends.
    pub fn stop_roast(&self) -> Result<()> {
        self.transition("stop the roast", RoastPhase::Roasting, RoastPhase::Cooling)?;
        self.send(Command::StopRoast)
    }

    /// Stop the polling thread and take the link back.
    ///
    /// Blocks for at most one in-flight exchange. Stopping while already
    /// stopped is a no-op. A live roast must be stopped first; stopping
    /// during cooling switches the motors off on the way out.
    pub fn stop_monitoring(&mut self) -> Result<()> {
        if self.worker.is_none() {
            return Ok(());
        }
        let state = self.state();
        if state == LoopState::Polling(RoastPhase::Roasting) {
            return Err(RoasterError::invalid_state("stop monitoring", state));
        }
        self.reclaim_link()?;
        self.shared.state.send_replace(LoopState::Stopped);
        info!("Monitoring stopped");
        Ok(())
    }

    /// Change the poll interval; takes effect after the current tick.
    pub fn set_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(RoasterError::config("poll interval must be positive"));
        }
        self.shared.interval.send_replace(interval);
        debug!("Poll interval set to {:?}", interval);
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        *self.shared.interval.borrow()
    }

    pub fn set_heater(&self, percent: u16) -> Result<()> {
        self.update(|settings| settings.set_heater(percent))?;
        Ok(())
    }

    /// Set the internal fan. Values snap to the nearest 10 %.
    pub fn set_fan(&self, percent: u16) -> Result<()> {
        self.update(|settings| settings.set_fan(percent))?;
        Ok(())
    }

    /// Set the main (exhaust) fan. Values snap to the nearest 10 %.
    pub fn set_main_fan(&self, percent: u16) -> Result<()> {
        self.update(|settings| settings.set_main_fan(percent))?;
        Ok(())
    }

    /// Flip the drum motor, returning its new state.
    pub fn toggle_drum(&self) -> bool {
        self.toggle(RoastSettings::drum_motor, RoastSettings::set_drum_motor)
    }

    /// Flip the cooling motor, returning its new state.
    pub fn toggle_cooling_motor(&self) -> bool {
        self.toggle(RoastSettings::cooling_motor, RoastSettings::set_cooling_motor)
    }

    /// Flip the bean door solenoid, returning its new state.
    pub fn toggle_solenoid(&self) -> bool {
        self.toggle(RoastSettings::solenoid, RoastSettings::set_solenoid)
    }

    /// Desired settings; the next tick sends these (with the cooling
    /// override applied while cooling).
    pub fn settings(&self) -> RoastSettings {
        *self.shared.settings.borrow()
    }

    pub fn state(&self) -> LoopState {
        *self.shared.state.borrow()
    }

    /// Watch state transitions.
    pub fn watch_state(&self) -> watch::Receiver<LoopState> {
        self.shared.state.subscribe()
    }

    /// Error that stopped the loop, until monitoring restarts.
    pub fn fault(&self) -> Option<Arc<TransportError>> {
        self.shared.fault.borrow().clone()
    }

    /// Every sample of the current or most recent roast, oldest first.
    pub fn roast_log(&self) -> Vec<Sample> {
        self.shared.roast_log.borrow().clone()
    }

    /// Most recently published tick since monitoring started.
    pub fn latest(&self) -> Option<Arc<TickResult>> {
        self.shared.latest.borrow().clone()
    }

    /// Stream of updates published after this call.
    ///
    /// A subscriber that falls behind skips the missed ticks.
    pub fn subscribe(&self) -> impl Stream<Item = RoasterUpdate> + Send + 'static {
        BroadcastStream::new(self.shared.updates.subscribe()).filter_map(|update| async move {
            match update {
                Ok(update) => Some(update),
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    debug!("Subscriber lagged, skipped {} updates", missed);
                    None
                }
            }
        })
    }

    /// Raw receiver for synchronous consumers.
    pub fn receiver(&self) -> broadcast::Receiver<RoasterUpdate> {
        self.shared.updates.subscribe()
    }

    fn transition(&self, operation: &'static str, from: RoastPhase, to: RoastPhase) -> Result<()> {
        let mut current = LoopState::Stopped;
        let moved = self.shared.state.send_if_modified(|state| {
            current = *state;
            if *state == LoopState::Polling(from) {
                *state = LoopState::Polling(to);
                true
            } else {
                false
            }
        });
        if moved { Ok(()) } else { Err(RoasterError::invalid_state(operation, current)) }
    }

    fn send(&self, command: Command) -> Result<()> {
        let worker = self.worker.as_ref().ok_or_else(|| RoasterError::Worker {
            reason: "polling thread is not running".to_string(),
        })?;
        worker.commands.send(command).map_err(|_| RoasterError::Worker {
            reason: "polling thread has exited".to_string(),
        })
    }

    fn update<F>(&self, apply: F) -> Result<RoastSettings, SettingsError>
    where
        F: FnOnce(&mut RoastSettings) -> Result<(), SettingsError>,
    {
        let mut outcome = Ok(RoastSettings::baseline());
        self.shared.settings.send_if_modified(|settings| {
            let mut next = *settings;
            outcome = apply(&mut next).map(|()| next);
            let changed = outcome.is_ok() && next != *settings;
            if changed {
                *settings = next;
            }
            changed
        });
        if let Err(e) = &outcome {
            warn!("Rejected setting: {}", e);
        }
        outcome
    }

    fn toggle(&self, get: fn(&RoastSettings) -> bool, set: fn(&mut RoastSettings, bool)) -> bool {
        let mut on = false;
        self.shared.settings.send_modify(|settings| {
            on = !get(settings);
            set(settings, on);
        });
        on
    }

    /// Cancel the worker, if any, and take its link back.
    fn reclaim_link(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        worker.cancel.cancel();
        let link = worker.handle.join().map_err(|_| RoasterError::Worker {
            reason: "polling thread panicked".to_string(),
        })?;
        self.link = Some(link);
        Ok(())
    }
}

impl Drop for Roaster {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            debug!("Dropping roaster, cancelling polling thread");
            worker.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::ScriptedLink;

    fn roaster() -> Roaster {
        Roaster::new(ScriptedLink::echoing([200]), RoasterConfig::default()).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = RoasterConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(
            Roaster::new(ScriptedLink::new(), config),
            Err(RoasterError::Config { .. })
        ));
    }

    #[test]
    fn roast_commands_require_polling() {
        let roaster = roaster();
        let err = roaster.start_roast().unwrap_err();
        assert!(matches!(
            err,
            RoasterError::InvalidState { state: LoopState::Stopped, .. }
        ));
        assert!(roaster.stop_roast().is_err());
    }

    #[test]
    fn out_of_range_settings_never_land() {
        let roaster = roaster();
        roaster.set_heater(55).unwrap();
        assert!(matches!(roaster.set_heater(101), Err(RoasterError::Settings(_))));
        assert!(roaster.set_fan(250).is_err());
        assert_eq!(roaster.settings().heater(), 55);
        assert_eq!(roaster.settings().fan(), 0);
    }

    #[test]
    fn toggles_flip_and_report() {
        let roaster = roaster();
        assert!(roaster.toggle_drum());
        assert!(roaster.settings().drum_motor());
        assert!(!roaster.toggle_drum());
        assert!(roaster.toggle_solenoid());
        assert!(roaster.toggle_cooling_motor());
        assert!(roaster.settings().cooling_motor());
    }

    #[test]
    fn interval_must_be_positive() {
        let roaster = roaster();
        assert_eq!(roaster.interval(), Duration::from_millis(500));
        assert!(matches!(
            roaster.set_interval(Duration::ZERO),
            Err(RoasterError::Config { .. })
        ));
        roaster.set_interval(Duration::from_millis(250)).unwrap();
        assert_eq!(roaster.interval(), Duration::from_millis(250));
    }

    #[test]
    fn stop_monitoring_when_stopped_is_a_no_op() {
        let mut roaster = roaster();
        roaster.stop_monitoring().unwrap();
        assert_eq!(roaster.state(), LoopState::Stopped);
    }
}
