//! Serial port link to a physical roaster

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::SerialConfig;
use crate::link::Link;
use crate::protocol::{FRAME_LEN, MARKER};
use crate::{Result, RoasterError};

/// Bytes skipped while hunting for a frame marker before giving up.
const MAX_RESYNC_BYTES: usize = FRAME_LEN * 2;

/// Link over a USB serial adapter.
pub struct SerialLink {
    path: String,
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialLink {
    /// Open the port at `path`. Discovering the path is up to the caller.
    pub fn open(path: impl Into<String>, config: &SerialConfig) -> Result<Self> {
        let path = path.into();
        let port = open_port(&path, config).map_err(|e| {
            RoasterError::connection_failed_with_source(
                format!("cannot open serial port {}", path),
                Box::new(e),
            )
        })?;

        info!(port = %path, baud = config.baud_rate, "Serial connection opened");

        Ok(Self { path, config: config.clone(), port: Some(port) })
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, format!("{} is closed", self.path))
        })
    }
}

fn open_port(path: &str, config: &SerialConfig) -> serialport::Result<Box<dyn SerialPort>> {
    serialport::new(path, config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(config.timeout())
        .open()
}

/// Read one frame starting at the next `MARKER`, skipping anything before it.
///
/// Returns how many bytes were discarded ahead of the marker.
fn read_marked_frame<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut [u8; FRAME_LEN],
    ceiling: Duration,
) -> io::Result<usize> {
    let started = Instant::now();
    let mut previous = None;
    let mut skipped = 0usize;
    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;

        if previous == Some(MARKER[0]) && byte[0] == MARKER[1] {
            break;
        }
        previous = Some(byte[0]);
        skipped += 1;

        if skipped > MAX_RESYNC_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("no frame marker within {} bytes", MAX_RESYNC_BYTES),
            ));
        }
        if started.elapsed() > ceiling {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "frame resync timed out"));
        }
    }

    buf[..2].copy_from_slice(&MARKER);
    reader.read_exact(&mut buf[2..])?;
    // The first marker byte was counted as skipped.
    Ok(skipped - 1)
}

impl Link for SerialLink {
    fn write_frame(&mut self, frame: &[u8; FRAME_LEN]) -> io::Result<()> {
        let port = self.port()?;
        // The roaster streams continuously; drop whatever queued up since the last tick.
        port.clear(ClearBuffer::All)?;
        port.write_all(frame)?;
        port.flush()?;
        trace!("Wrote command frame");
        Ok(())
    }

    fn read_frame(&mut self, buf: &mut [u8; FRAME_LEN]) -> io::Result<()> {
        let ceiling = self.config.timeout();
        let discarded = read_marked_frame(self.port()?, buf, ceiling)?;
        if discarded > 0 {
            debug!(discarded, "Resynchronised on frame marker");
        }
        Ok(())
    }

    fn reopen(&mut self) -> io::Result<()> {
        warn!(port = %self.path, "Reopening serial connection");
        // Release the old handle first; some platforms refuse a second open.
        self.port = None;
        let port = open_port(&self.path, &self.config)?;
        self.port = Some(port);
        info!(port = %self.path, "Serial connection reopened");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}
