//! Core types shared by the codec, the tracker and the polling loop.
//!
//! ## Data flow
//!
//! - [`RoastSettings`] is the desired control state; it is encoded into a
//!   command frame on every tick.
//! - [`Reading`] is the decoded view of a validated inbound frame, marked
//!   [`Freshness::Stale`] when it is a cached repeat.
//! - [`Sample`]s on the roast clock feed phase detection, which records
//!   [`RoastEvent`]s.
//! - [`TickResult`] bundles everything one poll cycle produced and is
//!   published to subscribers as a [`RoasterUpdate`].
//!
//! ```rust
//! use hottop::types::RoastSettings;
//!
//! let mut settings = RoastSettings::baseline();
//! settings.set_heater(80).unwrap();
//! settings.set_fan(35).unwrap();
//! assert_eq!(settings.fan(), 40); // fans move in 10 % steps
//! assert!(settings.set_heater(120).is_err());
//! ```

mod phase;
mod reading;
mod settings;
mod tick;

pub use phase::{EventKind, LoopState, RoastEvent, RoastPhase, Sample};
pub use reading::{Freshness, Reading, celsius_to_fahrenheit};
pub use settings::{FAN_STEP_PERCENT, MAX_PERCENT, RoastSettings};
pub use tick::{RoasterUpdate, TickResult};
