//! Protocol and polling engine for Hottop KN-8828B coffee roasters.
//!
//! The roaster speaks a fixed-length request/response protocol over a USB
//! serial adapter: every command frame carries the complete desired control
//! state, and the device answers with a status frame holding both sensor
//! temperatures and an echo of what it is actually doing.
//!
//! # Features
//!
//! - **Frame codec**: checksum-validated 36-byte frames in both directions
//! - **Resilient transport**: bounded retries, a stale-marked cache and
//!   automatic reconnects mask serial noise
//! - **Roast tracking**: charge and turning point detection plus rate of rise
//! - **Async friendly**: blocking I/O stays on one polling thread; results
//!   arrive as a `Stream`
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use hottop::{Roaster, RoasterConfig, RoasterUpdate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RoasterConfig::from_path("hottop.yaml")?;
//!     let mut roaster = Roaster::open("/dev/ttyUSB0", config)?;
//!     let mut updates = Box::pin(roaster.subscribe());
//!
//!     roaster.start_monitoring()?;
//!     while let Some(RoasterUpdate::Tick(tick)) = updates.next().await {
//!         println!("{:.1} °C ({})", tick.reading.bean_temp, tick.phase);
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire protocol and transport
pub mod link;
pub mod links;
pub mod protocol;
pub mod transport;

// Roast state and control
mod driver;
pub mod roaster;
pub mod session;
pub mod tracker;

// Core exports
pub use config::RoasterConfig;
pub use error::*;
pub use types::*;

pub use link::Link;
pub use links::{ScriptedLink, SerialLink};
pub use protocol::FrameCodec;
pub use roaster::Roaster;
pub use session::{RoastSession, SessionSnapshot};
pub use tracker::RoastPhaseTracker;
pub use transport::RetryingTransport;
