//! In-memory link that replays a scripted sequence of responses
//!
//! Handy for tests and for exercising the engine without hardware. Clones
//! share the same script, so a test can keep one handle for assertions
//! while the polling thread owns another.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::link::Link;
use crate::protocol::{FRAME_LEN, FrameCodec, status_frame};
use crate::types::RoastSettings;

/// One scripted answer to a `read_frame` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Return these bytes verbatim.
    Frame([u8; FRAME_LEN]),

    /// Answer with a valid status frame echoing the last command written.
    Echo { bean: u16, env: u16 },

    /// Fail the read.
    Error(io::ErrorKind),
}

#[derive(Debug, Default)]
struct Script {
    responses: VecDeque<Response>,
    /// Served once the queue runs dry
    fallback: Option<Response>,
    written: Vec<[u8; FRAME_LEN]>,
    reads: usize,
    reopens: usize,
    fail_reopen: bool,
    fail_writes: bool,
}

/// Scripted, shareable [`Link`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedLink {
    script: Arc<Mutex<Script>>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link whose device reports `temps` as bean temperatures, one per read,
    /// then keeps repeating the last one.
    pub fn echoing<I>(temps: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        let link = Self::new();
        let mut last = None;
        for bean in temps {
            link.push(Response::Echo { bean, env: bean });
            last = Some(bean);
        }
        if let Some(bean) = last {
            link.repeat(Response::Echo { bean, env: bean });
        }
        link
    }

    pub fn push(&self, response: Response) {
        self.lock().responses.push_back(response);
    }

    /// Queue several responses at once, so no repeat response can slip
    /// between them.
    pub fn extend<I>(&self, responses: I)
    where
        I: IntoIterator<Item = Response>,
    {
        self.lock().responses.extend(responses);
    }

    pub fn push_frame(&self, frame: [u8; FRAME_LEN]) {
        self.push(Response::Frame(frame));
    }

    /// Queue a status frame with fixed settings and temperatures.
    pub fn push_status(&self, settings: &RoastSettings, bean: u16, env: u16) {
        self.push_frame(status_frame(settings, bean, env, true));
    }

    /// Queue a frame whose checksum is wrong.
    pub fn push_corrupt(&self) {
        let mut frame = status_frame(&RoastSettings::baseline(), 200, 200, true);
        frame[FRAME_LEN - 1] = frame[FRAME_LEN - 1].wrapping_add(1);
        self.push_frame(frame);
    }

    /// Response served whenever the queue is empty. Without one, reads time out.
    pub fn repeat(&self, response: Response) {
        self.lock().fallback = Some(response);
    }

    pub fn clear_repeat(&self) {
        self.lock().fallback = None;
    }

    pub fn fail_reopen(&self, fail: bool) {
        self.lock().fail_reopen = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Every command frame written so far.
    pub fn written(&self) -> Vec<[u8; FRAME_LEN]> {
        self.lock().written.clone()
    }

    /// Settings carried by the most recent command frame.
    pub fn last_command(&self) -> Option<RoastSettings> {
        let script = self.lock();
        script.written.last().and_then(|frame| FrameCodec::decode_echo(frame).ok())
    }

    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    pub fn reopens(&self) -> usize {
        self.lock().reopens
    }

    /// Responses still queued.
    pub fn pending(&self) -> usize {
        self.lock().responses.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Link for ScriptedLink {
    fn write_frame(&mut self, frame: &[u8; FRAME_LEN]) -> io::Result<()> {
        let mut script = self.lock();
        if script.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted write failure"));
        }
        script.written.push(*frame);
        Ok(())
    }

    fn read_frame(&mut self, buf: &mut [u8; FRAME_LEN]) -> io::Result<()> {
        let mut script = self.lock();
        script.reads += 1;

        let queued = script.responses.pop_front();
        let response = match queued.or_else(|| script.fallback.clone()) {
            Some(response) => response,
            None => return Err(io::Error::new(io::ErrorKind::TimedOut, "script exhausted")),
        };

        match response {
            Response::Frame(frame) => *buf = frame,
            Response::Echo { bean, env } => {
                let settings = script
                    .written
                    .last()
                    .and_then(|frame| FrameCodec::decode_echo(frame).ok())
                    .unwrap_or_default();
                *buf = status_frame(&settings, bean, env, true);
            }
            Response::Error(kind) => return Err(io::Error::new(kind, "scripted read failure")),
        }
        Ok(())
    }

    fn reopen(&mut self) -> io::Result<()> {
        let mut script = self.lock();
        script.reopens += 1;
        if script.fail_reopen {
            return Err(io::Error::new(io::ErrorKind::NotFound, "scripted reopen failure"));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
