//! Retrying request/response exchange over a [`Link`]
//!
//! One exchange writes a command frame and reads status frames until one
//! validates. The escalation policy is kept apart from the I/O in
//! [`RetryLadder`], which only sees tagged [`Attempt`] outcomes:
//!
//! 1. a valid frame is accepted and cached;
//! 2. an invalid frame is re-read, without re-writing, up to
//!    `max_attempts` reads in total;
//! 3. an exhausted exchange falls back to the cached reading, marked stale;
//! 4. after `reconnect_after` exhausted exchanges in a row the link is
//!    reopened once, and a failed reopen ends the session.

use std::io;
use tracing::{debug, error, trace, warn};

use crate::config::RetryPolicy;
use crate::error::{FrameError, TransportError};
use crate::link::Link;
use crate::protocol::{CommandFrame, FRAME_LEN, FrameCodec};
use crate::types::Reading;

/// Outcome of a single read.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    Success(Reading),
    /// A frame arrived but failed validation.
    Invalid(FrameError),
    /// Nothing usable arrived (timeout or I/O error).
    Unreadable(io::ErrorKind),
}

/// What to do after an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept(Reading),
    Retry,
    Exhausted,
}

/// What to do after an exhausted exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Serve the cached reading.
    FallBack,
    /// Reopen the link, then serve the cached reading.
    Reconnect,
}

/// Pure retry and escalation policy.
#[derive(Debug, Clone)]
pub struct RetryLadder {
    policy: RetryPolicy,
    attempts: u32,
    exhausted_in_a_row: u32,
}

impl RetryLadder {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempts: 0, exhausted_in_a_row: 0 }
    }

    /// Start counting reads for a new exchange.
    pub fn begin(&mut self) {
        self.attempts = 0;
    }

    pub fn judge(&mut self, attempt: Attempt) -> Verdict {
        match attempt {
            Attempt::Success(reading) => {
                self.exhausted_in_a_row = 0;
                Verdict::Accept(reading)
            }
            Attempt::Invalid(_) | Attempt::Unreadable(_) => {
                self.attempts += 1;
                if self.attempts >= self.policy.max_attempts {
                    Verdict::Exhausted
                } else {
                    Verdict::Retry
                }
            }
        }
    }

    /// Record an exhausted exchange.
    ///
    /// The in-a-row counter resets when a reconnect is requested, whether or
    /// not the reconnect later succeeds.
    pub fn escalate(&mut self) -> Escalation {
        self.exhausted_in_a_row += 1;
        if self.exhausted_in_a_row >= self.policy.reconnect_after {
            self.exhausted_in_a_row = 0;
            Escalation::Reconnect
        } else {
            Escalation::FallBack
        }
    }

    /// Exhausted exchanges since the last success or reconnect.
    pub fn exhausted_in_a_row(&self) -> u32 {
        self.exhausted_in_a_row
    }
}

/// Link wrapper applying the retry, cache and reconnect policy.
pub struct RetryingTransport<L> {
    link: L,
    ladder: RetryLadder,
    cache: Option<Reading>,
    stale_cycles: u32,
}

impl<L: Link> RetryingTransport<L> {
    pub fn new(link: L, policy: RetryPolicy) -> Self {
        Self { link, ladder: RetryLadder::new(policy), cache: None, stale_cycles: 0 }
    }

    /// Seed the known-good cache, as if `reading` had just been received.
    pub fn with_cached(mut self, reading: Reading) -> Self {
        self.cache = Some(reading);
        self
    }

    /// Exchanges in a row answered from the cache.
    pub fn stale_cycles(&self) -> u32 {
        self.stale_cycles
    }

    /// Last known-good reading.
    pub fn cached(&self) -> Option<&Reading> {
        self.cache.as_ref()
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    /// Write `frame` and return the next valid reading, or the cached one.
    pub fn exchange(&mut self, frame: &CommandFrame) -> Result<Reading, TransportError> {
        self.ladder.begin();

        if let Err(e) = self.link.write_frame(frame.as_bytes()) {
            warn!("Command write to {} failed: {}", self.link.describe(), e);
            return self.fall_back();
        }

        loop {
            let attempt = self.read_attempt();
            match self.ladder.judge(attempt) {
                Verdict::Accept(reading) => {
                    if self.stale_cycles > 0 {
                        debug!("Fresh frame after {} stale exchanges", self.stale_cycles);
                    }
                    self.stale_cycles = 0;
                    self.cache = Some(reading);
                    return Ok(reading);
                }
                Verdict::Retry => continue,
                Verdict::Exhausted => return self.fall_back(),
            }
        }
    }

    fn read_attempt(&mut self) -> Attempt {
        let mut buf = [0u8; FRAME_LEN];
        match self.link.read_frame(&mut buf) {
            Ok(()) => match FrameCodec::decode(&buf) {
                Ok(reading) => Attempt::Success(reading),
                Err(e) => {
                    debug!("Discarding frame: {}", e);
                    Attempt::Invalid(e)
                }
            },
            Err(e) => {
                debug!("Read failed: {}", e);
                Attempt::Unreadable(e.kind())
            }
        }
    }

    fn fall_back(&mut self) -> Result<Reading, TransportError> {
        if self.ladder.escalate() == Escalation::Reconnect {
            let target = self.link.describe();
            if let Err(e) = self.link.reopen() {
                error!("Reopening {} failed: {}", target, e);
                return Err(TransportError::connection_lost(
                    format!("could not reopen {}", target),
                    Some(e),
                ));
            }
        }

        match &self.cache {
            Some(reading) => {
                self.stale_cycles += 1;
                trace!("Serving cached reading ({} stale exchanges)", self.stale_cycles);
                Ok(reading.as_stale(self.stale_cycles))
            }
            None => Err(TransportError::NoData),
        }
    }
}
