//! Scripted stream and writers shared by the unit tests.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::error::FeedError;
use crate::models::packet::{float_bytes, PacketHeader};
use crate::session::capture_loop::LoopHandle;
use crate::traits::packet_stream::PacketStream;

/// One scripted answer to `acquire_packet`.
pub(crate) enum Step {
    Nothing,
    Packet { header: PacketHeader, bytes: Vec<u8> },
    /// Claims `frames` stereo float frames but carries only 4 bytes.
    Malformed { frames: u32 },
    Fail(FeedError),
}

impl Step {
    pub(crate) fn stereo(samples: &[f32]) -> Self {
        Self::Packet {
            header: PacketHeader::float_stereo((samples.len() / 2) as u32),
            bytes: float_bytes(samples),
        }
    }

    pub(crate) fn empty() -> Self {
        Self::Packet {
            header: PacketHeader::float_stereo(0),
            bytes: Vec::new(),
        }
    }
}

/// Everything the stream saw, inspectable after the stream is moved or dropped.
#[derive(Default)]
pub(crate) struct StreamLog {
    pub acquires: usize,
    pub releases: Vec<u32>,
    pub starts: usize,
    pub stops: usize,
    pub drops: usize,
    pub protocol_violation: bool,
    pub fail_start: Option<FeedError>,
    pub fail_next_release: Option<FeedError>,
    pub stop_when_exhausted: Option<LoopHandle>,
}

pub(crate) struct ScriptedStream {
    steps: VecDeque<Step>,
    held: Option<(PacketHeader, Vec<u8>)>,
    log: Arc<Mutex<StreamLog>>,
}

impl ScriptedStream {
    pub(crate) fn new(steps: Vec<Step>) -> (Self, Arc<Mutex<StreamLog>>) {
        let log = Arc::new(Mutex::new(StreamLog::default()));
        let stream = Self {
            steps: steps.into(),
            held: None,
            log: Arc::clone(&log),
        };
        (stream, log)
    }
}

impl PacketStream for ScriptedStream {
    fn device_name(&self) -> &str {
        "Scripted Loopback"
    }

    fn start(&mut self) -> Result<(), FeedError> {
        let mut log = self.log.lock();
        log.starts += 1;
        match log.fail_start.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn stop(&mut self) -> Result<(), FeedError> {
        self.log.lock().stops += 1;
        Ok(())
    }

    fn acquire_packet(&mut self) -> Result<Option<PacketHeader>, FeedError> {
        let mut log = self.log.lock();
        log.acquires += 1;
        if self.held.is_some() {
            log.protocol_violation = true;
        }

        match self.steps.pop_front() {
            None => {
                if let Some(handle) = &log.stop_when_exhausted {
                    handle.request_stop();
                }
                Ok(None)
            }
            Some(Step::Nothing) => Ok(None),
            Some(Step::Packet { header, bytes }) => {
                self.held = Some((header, bytes));
                Ok(Some(header))
            }
            Some(Step::Malformed { frames }) => {
                let header = PacketHeader::float_stereo(frames);
                self.held = Some((header, vec![0; 4]));
                Ok(Some(header))
            }
            Some(Step::Fail(e)) => Err(e),
        }
    }

    fn packet_bytes(&self) -> &[u8] {
        self.held.as_ref().map(|(_, bytes)| bytes.as_slice()).unwrap_or(&[])
    }

    fn release_packet(&mut self, frames: u32) -> Result<(), FeedError> {
        let mut log = self.log.lock();
        match self.held.take() {
            Some((header, _)) if header.frames == frames => {}
            _ => log.protocol_violation = true,
        }
        log.releases.push(frames);
        match log.fail_next_release.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.log.lock().drops += 1;
    }
}

/// Cloneable in-memory writer.
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub(crate) fn lines(&self) -> Vec<String> {
        String::from_utf8(self.0.lock().clone())
            .expect("utf-8 output")
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that fails every write with `kind`.
pub(crate) struct FailingWriter(pub io::ErrorKind);

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(self.0, "scripted write failure"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
