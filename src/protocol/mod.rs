//! Hottop serial protocol

mod frame;

pub use frame::{
    CommandFrame, FRAME_LEN, FrameCodec, MARKER, MAX_PLAUSIBLE_CELSIUS, MIN_PLAUSIBLE_CELSIUS,
    status_frame,
};
