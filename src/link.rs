//! Link trait for the byte stream to the roaster

use std::io;

use crate::protocol::FRAME_LEN;

/// Blocking, frame-oriented byte stream to a roaster.
///
/// A link is owned by exactly one polling thread, so implementations need
/// `Send` but never `Sync`. Every call must return within the link's own
/// timeout; the retry ladder relies on that for bounded tick latency.
pub trait Link: Send + 'static {
    /// Write one command frame.
    fn write_frame(&mut self, frame: &[u8; FRAME_LEN]) -> io::Result<()>;

    /// Read the next inbound frame into `buf`.
    ///
    /// Implementations may skip bytes to find the frame marker, but must
    /// give up after a bounded amount of input.
    fn read_frame(&mut self, buf: &mut [u8; FRAME_LEN]) -> io::Result<()>;

    /// Close and reopen the underlying connection.
    fn reopen(&mut self) -> io::Result<()>;

    /// Human-readable name for logs, such as the port path.
    fn describe(&self) -> String;
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn write_frame(&mut self, frame: &[u8; FRAME_LEN]) -> io::Result<()> {
        (**self).write_frame(frame)
    }

    fn read_frame(&mut self, buf: &mut [u8; FRAME_LEN]) -> io::Result<()> {
        (**self).read_frame(buf)
    }

    fn reopen(&mut self) -> io::Result<()> {
        (**self).reopen()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
