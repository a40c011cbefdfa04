//! Polling loop that owns the link on a dedicated thread
//!
//! One tick is: apply queued commands, build the command frame from the
//! current settings snapshot, exchange it, feed the reading to the session
//! and the tracker, then publish the composite result. Settings and
//! commands only cross into the loop at tick boundaries, so an in-flight
//! exchange always sees one consistent snapshot.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{PollingConfig, RoasterConfig};
use crate::error::TransportError;
use crate::link::Link;
use crate::protocol::FrameCodec;
use crate::session::RoastSession;
use crate::tracker::RoastPhaseTracker;
use crate::transport::RetryingTransport;
use crate::types::{LoopState, Reading, RoastPhase, RoastSettings, RoasterUpdate, Sample, TickResult};

/// Longest uninterrupted sleep between cancellation checks
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// Phase transitions requested from outside the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    StartRoast,
    StopRoast,
}

/// Channels shared between the control handle and the loop thread.
#[derive(Debug, Clone)]
pub(crate) struct Shared {
    pub settings: Arc<watch::Sender<RoastSettings>>,
    pub state: Arc<watch::Sender<LoopState>>,
    pub latest: Arc<watch::Sender<Option<Arc<TickResult>>>>,
    pub fault: Arc<watch::Sender<Option<Arc<TransportError>>>>,
    /// Poll interval, read once per tick
    pub interval: Arc<watch::Sender<Duration>>,
    /// Every sample of the current roast
    pub roast_log: Arc<watch::Sender<Vec<Sample>>>,
    pub updates: broadcast::Sender<RoasterUpdate>,
}

impl Shared {
    pub fn new(capacity: usize, interval: Duration) -> Self {
        let (updates, _) = broadcast::channel(capacity);
        Self {
            settings: Arc::new(watch::Sender::new(RoastSettings::baseline())),
            state: Arc::new(watch::Sender::new(LoopState::Stopped)),
            latest: Arc::new(watch::Sender::new(None)),
            fault: Arc::new(watch::Sender::new(None)),
            interval: Arc::new(watch::Sender::new(interval)),
            roast_log: Arc::new(watch::Sender::new(Vec::new())),
            updates,
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TickOutcome {
    Published(Arc<TickResult>),
    /// No reading was available; nothing was published.
    Skipped,
    /// The connection is gone and the loop must stop.
    Terminal,
}

pub(crate) struct PollingLoop<L> {
    transport: RetryingTransport<L>,
    session: RoastSession,
    tracker: RoastPhaseTracker,
    polling: PollingConfig,
    shared: Shared,
    commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
    ticks: u64,
}

impl<L: Link> PollingLoop<L> {
    pub fn new(
        link: L,
        config: &RoasterConfig,
        seed: Option<Reading>,
        shared: Shared,
        commands: mpsc::UnboundedReceiver<Command>,
        cancel: CancellationToken,
    ) -> Self {
        let mut transport = RetryingTransport::new(link, config.retry);
        if let Some(reading) = seed {
            transport = transport.with_cached(reading);
        }

        Self {
            transport,
            session: RoastSession::new(config.polling.history_len),
            tracker: RoastPhaseTracker::new(config.detection.clone()),
            polling: config.polling.clone(),
            shared,
            commands,
            cancel,
            ticks: 0,
        }
    }

    #[cfg(test)]
    pub fn session(&self) -> &RoastSession {
        &self.session
    }

    /// Run until cancelled or the connection is lost, then hand the link back.
    pub fn run(mut self) -> L {
        let target = self.transport.link_mut().describe();
        info!("Polling {} every {:?}", target, self.interval());

        self.wake_up();

        let mut faulted = false;
        while !self.cancel.is_cancelled() {
            let started = Instant::now();
            if self.tick(started) == TickOutcome::Terminal {
                faulted = true;
                break;
            }
            if !self.pause_until(started + self.interval()) {
                break;
            }
        }

        if !faulted {
            self.shutdown(Instant::now());
        }
        info!("Polling {} ended after {} ticks", target, self.ticks);
        self.transport.into_link()
    }

    /// One full poll cycle.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        self.ticks += 1;
        self.apply_commands(now);
        self.expire_cooling(now);

        let phase = self.session.phase();
        let mut sent = *self.shared.settings.borrow();
        if phase == RoastPhase::Cooling {
            sent = sent.with_cooling_override();
        }

        let frame = FrameCodec::encode(&sent);
        let reading = match self.transport.exchange(&frame) {
            Ok(reading) => reading,
            Err(e) if !e.is_terminal() => {
                debug!("Tick {} skipped: {}", self.ticks, e);
                return TickOutcome::Skipped;
            }
            Err(e) => {
                self.fail(e);
                return TickOutcome::Terminal;
            }
        };

        let elapsed = self.session.elapsed(now);
        let mut event = None;
        let mut rate_of_rise = None;
        if let Some(elapsed) = elapsed {
            let sample = Sample::new(elapsed, reading.bean_temp);
            self.session.record(sample);
            self.shared.roast_log.send_modify(|log| log.push(sample));
            event = self.tracker.observe(&mut self.session, sample);
            rate_of_rise = self.session.rate_of_rise();
        }

        let result = Arc::new(TickResult {
            tick: self.ticks,
            reading,
            phase,
            sent,
            elapsed,
            rate_of_rise,
            event,
        });
        trace!(
            "Tick {}: bean={:.1} env={:.1} phase={} stale={}",
            result.tick,
            reading.bean_temp,
            reading.env_temp,
            phase,
            reading.is_stale()
        );

        self.shared.latest.send_replace(Some(result.clone()));
        // No subscribers is fine.
        let _ = self.shared.updates.send(RoasterUpdate::Tick(result.clone()));
        TickOutcome::Published(result)
    }

    fn apply_commands(&mut self, now: Instant) {
        while let Ok(command) = self.commands.try_recv() {
            let applied = match command {
                Command::StartRoast => self.session.begin_roast(now),
                Command::StopRoast => self.session.begin_cooling(now),
            };
            match applied {
                Ok(()) => {
                    if command == Command::StartRoast {
                        self.shared.roast_log.send_modify(Vec::clear);
                    }
                    self.publish_phase();
                }
                Err(e) => warn!("Ignoring {:?}: {}", command, e),
            }
        }
    }

    fn expire_cooling(&mut self, now: Instant) {
        let Some(cooled) = self.session.cooling_elapsed(now) else {
            return;
        };
        if cooled < self.polling.cooling() {
            return;
        }
        if self.session.finish_cooling().is_ok() {
            self.shared.settings.send_modify(|settings| *settings = settings.with_idle_motors());
            self.publish_phase();
        }
    }

    fn publish_phase(&self) {
        let state = LoopState::Polling(self.session.phase());
        self.shared.state.send_replace(state);
    }

    /// Prime the device with a few command frames before polling starts.
    fn wake_up(&mut self) {
        let interval = self.interval();
        for i in 0..self.polling.wake_up_frames {
            let settings = *self.shared.settings.borrow();
            let frame = FrameCodec::encode(&settings);
            if let Err(e) = self.transport.link_mut().write_frame(frame.as_bytes()) {
                warn!("Wake-up frame {} failed: {}", i + 1, e);
            }
            if !self.pause_until(Instant::now() + interval) {
                return;
            }
        }
    }

    fn interval(&self) -> Duration {
        *self.shared.interval.borrow()
    }

    /// Sleep until `deadline`; false if cancelled first.
    fn pause_until(&self, deadline: Instant) -> bool {
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(CANCEL_POLL));
        }
    }

    fn fail(&mut self, e: TransportError) {
        error!("Polling stopped: {}", e);
        self.park(Instant::now());
        let fault = Arc::new(e);
        self.shared.fault.send_replace(Some(fault.clone()));
        self.shared.state.send_replace(LoopState::Stopped);
        let _ = self.shared.updates.send(RoasterUpdate::Fault(fault));
    }

    fn shutdown(&mut self, now: Instant) {
        self.park(now);
        self.shared.state.send_replace(LoopState::Stopped);
    }

    /// Leave the roaster safe before the loop exits.
    ///
    /// A live roast is cut over to cooling and gets one cooling frame; a
    /// cooling roaster gets its motors switched off. Idle writes nothing.
    fn park(&mut self, now: Instant) {
        let settings = *self.shared.settings.borrow();
        let last = match self.session.phase() {
            RoastPhase::Idle => return,
            RoastPhase::Roasting => {
                warn!("Polling ended mid-roast, switching to cooling");
                if let Err(e) = self.session.begin_cooling(now) {
                    warn!("Could not begin cooling: {}", e);
                }
                settings.with_cooling_override()
            }
            RoastPhase::Cooling => {
                let idle = settings.with_idle_motors();
                self.shared.settings.send_replace(idle);
                idle
            }
        };

        let frame = FrameCodec::encode(&last);
        if let Err(e) = self.transport.link_mut().write_frame(frame.as_bytes()) {
            warn!("Final command frame failed: {}", e);
        }
    }
}
