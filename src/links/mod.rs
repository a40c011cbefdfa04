//! Link implementations

pub mod scripted;
pub mod serial;

pub use scripted::{Response, ScriptedLink};
pub use serial::SerialLink;
