//! Hottop frame layout, encoding and validation
//!
//! Both directions use the same fixed 36-byte frame. There are no
//! delimiters: the two-byte marker and the trailing checksum are the only
//! framing signals.
//!
//! ```text
//! offset  0..=1   marker A5 96
//! offset  2..=6   preamble B0 A0 01 01 24 (host to device)
//! offset 10       heater, 0-100
//! offset 11       fan, 0-10 steps
//! offset 12       main fan, 0-10 steps
//! offset 16       solenoid
//! offset 17       drum motor
//! offset 18       cooling motor
//! offset 19       chaff tray (device to host)
//! offset 23..=24  environment temperature, big-endian °C
//! offset 25..=26  bean temperature, big-endian °C
//! offset 35       wrapping sum of bytes 0..35
//! ```

use tracing::trace;

use crate::error::{FrameError, InvalidFrame};
use crate::types::{Freshness, Reading, RoastSettings};

/// Length of every frame in both directions.
pub const FRAME_LEN: usize = 36;

/// Leading marker bytes.
pub const MARKER: [u8; 2] = [0xA5, 0x96];

/// Fixed command preamble following the marker.
const PREAMBLE: [u8; 5] = [0xB0, 0xA0, 0x01, 0x01, 0x24];

/// Temperatures below this are line noise, not a real sensor.
pub const MIN_PLAUSIBLE_CELSIUS: u16 = 5;

/// Temperatures above this cannot come from the roaster.
pub const MAX_PLAUSIBLE_CELSIUS: u16 = 500;

const HEATER: usize = 10;
const FAN: usize = 11;
const MAIN_FAN: usize = 12;
const SOLENOID: usize = 16;
const DRUM_MOTOR: usize = 17;
const COOLING_MOTOR: usize = 18;
const CHAFF_TRAY: usize = 19;
const ENV_TEMP: usize = 23;
const BEAN_TEMP: usize = 25;
const CHECKSUM: usize = FRAME_LEN - 1;

/// Outbound frame built from a settings snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame([u8; FRAME_LEN]);

impl CommandFrame {
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }
}

impl AsRef<[u8]> for CommandFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Stateless encoder/decoder for Hottop frames.
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a settings snapshot into a command frame.
    pub fn encode(settings: &RoastSettings) -> CommandFrame {
        let mut frame = [0u8; FRAME_LEN];
        frame[..2].copy_from_slice(&MARKER);
        frame[2..2 + PREAMBLE.len()].copy_from_slice(&PREAMBLE);
        frame[HEATER] = settings.heater();
        frame[FAN] = settings.fan_steps();
        frame[MAIN_FAN] = settings.main_fan_steps();
        frame[SOLENOID] = u8::from(settings.solenoid());
        frame[DRUM_MOTOR] = u8::from(settings.drum_motor());
        frame[COOLING_MOTOR] = u8::from(settings.cooling_motor());
        seal(&mut frame);
        CommandFrame(frame)
    }

    /// Decode and fully validate an inbound status frame.
    pub fn decode(bytes: &[u8]) -> Result<Reading, FrameError> {
        let frame = validate_structure(bytes)?;

        let env = read_u16_be(frame, ENV_TEMP);
        let bean = read_u16_be(frame, BEAN_TEMP);
        check_plausible("environment", env)?;
        check_plausible("bean", bean)?;

        trace!(bean, env, "Decoded status frame");

        Ok(Reading {
            bean_temp: f64::from(bean),
            env_temp: f64::from(env),
            settings: settings_from(frame),
            chaff_tray: frame[CHAFF_TRAY] != 0,
            valid: true,
            freshness: Freshness::Fresh,
        })
    }

    /// Decode only the control fields, checking length, marker and checksum.
    ///
    /// Command frames carry no temperatures, so this is the inverse of
    /// [`FrameCodec::encode`].
    pub fn decode_echo(bytes: &[u8]) -> Result<RoastSettings, FrameError> {
        validate_structure(bytes).map(settings_from)
    }

    /// Wrapping byte sum over everything but the checksum slot.
    pub fn checksum(bytes: &[u8]) -> u8 {
        bytes.iter().take(CHECKSUM).fold(0u8, |sum, b| sum.wrapping_add(*b))
    }
}

/// Write the checksum into the last byte of a frame.
pub(crate) fn seal(frame: &mut [u8; FRAME_LEN]) {
    frame[CHECKSUM] = FrameCodec::checksum(frame);
}

fn validate_structure(bytes: &[u8]) -> Result<&[u8; FRAME_LEN], FrameError> {
    let frame: &[u8; FRAME_LEN] = bytes
        .try_into()
        .map_err(|_| InvalidFrame::Length { expected: FRAME_LEN, found: bytes.len() })?;

    if frame[..2] != MARKER {
        return Err(InvalidFrame::Marker { found: [frame[0], frame[1]] }.into());
    }

    let computed = FrameCodec::checksum(frame);
    let received = frame[CHECKSUM];
    if computed != received {
        return Err(InvalidFrame::Checksum { computed, received }.into());
    }

    Ok(frame)
}

fn check_plausible(sensor: &'static str, celsius: u16) -> Result<(), FrameError> {
    if (MIN_PLAUSIBLE_CELSIUS..=MAX_PLAUSIBLE_CELSIUS).contains(&celsius) {
        Ok(())
    } else {
        Err(InvalidFrame::Temperature { sensor, celsius }.into())
    }
}

fn settings_from(frame: &[u8; FRAME_LEN]) -> RoastSettings {
    RoastSettings::from_device(
        frame[HEATER],
        frame[FAN],
        frame[MAIN_FAN],
        frame[DRUM_MOTOR] != 0,
        frame[COOLING_MOTOR] != 0,
        frame[SOLENOID] != 0,
    )
}

fn read_u16_be(frame: &[u8; FRAME_LEN], offset: usize) -> u16 {
    u16::from_be_bytes([frame[offset], frame[offset + 1]])
}

/// Build a device status frame echoing `settings` with the given temperatures.
///
/// The roaster answers with the same layout as the command frame plus
/// temperature and chaff tray fields.
pub fn status_frame(
    settings: &RoastSettings,
    bean_celsius: u16,
    env_celsius: u16,
    chaff_tray: bool,
) -> [u8; FRAME_LEN] {
    let mut frame = *FrameCodec::encode(settings).as_bytes();
    frame[CHAFF_TRAY] = u8::from(chaff_tray);
    frame[ENV_TEMP..ENV_TEMP + 2].copy_from_slice(&env_celsius.to_be_bytes());
    frame[BEAN_TEMP..BEAN_TEMP + 2].copy_from_slice(&bean_celsius.to_be_bytes());
    seal(&mut frame);
    frame
}
