//! Output of attached processes after the connection has been hijacked.
//!
//! Without a pseudo-terminal the engine multiplexes stdout and stderr on one
//! byte stream. Every block is preceded by an 8-byte header:
//!
//! ```text
//! [stream id][0][0][0][length: u32 big-endian]
//! ```
//!
//! With a pseudo-terminal the bytes are the combined output verbatim.

use std::fmt;
use std::io;
use std::io::Read;
use std::io::Write;

use tracing::trace;

use crate::error::FrameError;
use crate::error::WireError;
use crate::Result;

pub const HEADER_LEN: usize = 8;

pub const MULTIPLEXED_CONTENT_TYPE: &str = "application/vnd.docker.multiplexed-stream";
pub const RAW_CONTENT_TYPE: &str = "application/vnd.docker.raw-stream";

/// Read size for tty mode, where there are no frame boundaries.
const RAW_BLOCK: usize = 8 * 1024;
/// Upper bound on the buffer reserved before a frame payload arrives.
const INITIAL_PAYLOAD_CAPACITY: u32 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Combined output, not separable.
    Tty,
    /// Framed stdout/stderr.
    Multiplexed,
}

impl StreamMode {
    /// An explicit content type from the engine wins over the caller's tty
    /// flag.
    pub fn negotiate(content_type: Option<&str>, tty: bool) -> Self {
        match content_type.map(str::trim) {
            Some(value) if value.starts_with(MULTIPLEXED_CONTENT_TYPE) => StreamMode::Multiplexed,
            Some(value) if value.starts_with(RAW_CONTENT_TYPE) => StreamMode::Tty,
            _ if tty => StreamMode::Tty,
            _ => StreamMode::Multiplexed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamId {
    Stdin,
    Stdout,
    Stderr,
}

impl StreamId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamId::Stdin => "stdin",
            StreamId::Stdout => "stdout",
            StreamId::Stderr => "stderr",
        }
    }
}

impl TryFrom<u8> for StreamId {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(StreamId::Stdin),
            1 => Ok(StreamId::Stdout),
            2 => Ok(StreamId::Stderr),
            other => Err(WireError::ProtocolViolation(format!(
                "unknown stream id {other}"
            ))),
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One block of output. In tty mode every block is tagged stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub stream: StreamId,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub stdout_bytes: u64,
    pub stderr_bytes: u64,
    pub frames: u64,
}

/// Splits hijacked output into frames.
///
/// Frames are consumed strictly in order and each payload is drained in full
/// before the next header is read. Any error leaves the stream unusable.
pub struct StreamDemultiplexer<R> {
    inner: R,
    mode: StreamMode,
}

impl<R: Read> StreamDemultiplexer<R> {
    pub fn new(inner: R, mode: StreamMode) -> Self {
        Self { inner, mode }
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Next frame, or `None` once the engine closes the stream on a frame
    /// boundary.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.mode {
            StreamMode::Tty => self.next_raw(),
            StreamMode::Multiplexed => self.next_multiplexed(),
        }
    }

    fn next_raw(&mut self) -> Result<Option<Frame>> {
        let mut block = vec![0u8; RAW_BLOCK];
        let n = loop {
            match self.inner.read(&mut block) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            return Ok(None);
        }
        block.truncate(n);
        Ok(Some(Frame {
            stream: StreamId::Stdout,
            payload: block,
        }))
    }

    fn next_multiplexed(&mut self) -> Result<Option<Frame>> {
        let mut header = [0u8; HEADER_LEN];
        let filled = read_full(&mut self.inner, &mut header)?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < HEADER_LEN {
            return Err(WireError::BrokenFrame(format!(
                "stream ended after {filled} of {HEADER_LEN} frame header bytes"
            )));
        }

        let stream = StreamId::try_from(header[0])?;
        let length = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        trace!(stream = %stream, length, "Frame header");

        // The length is peer-controlled; let the buffer grow with the data.
        let mut payload = Vec::with_capacity(length.min(INITIAL_PAYLOAD_CAPACITY) as usize);
        (&mut self.inner)
            .take(u64::from(length))
            .read_to_end(&mut payload)?;
        if payload.len() < length as usize {
            return Err(WireError::BrokenFrame(format!(
                "stream ended after {} of {length} {stream} payload bytes",
                payload.len()
            )));
        }

        Ok(Some(Frame { stream, payload }))
    }

    /// Drains every frame into the two sinks until the stream ends. Stdin
    /// echo frames go to `stdout`.
    pub fn copy_to<O: Write, E: Write>(&mut self, stdout: &mut O, stderr: &mut E) -> Result<CopyStats> {
        let mut stats = CopyStats::default();
        while let Some(frame) = self.next_frame()? {
            stats.frames += 1;
            match frame.stream {
                StreamId::Stdout | StreamId::Stdin => {
                    stdout.write_all(&frame.payload)?;
                    stdout.flush()?;
                    stats.stdout_bytes += frame.payload.len() as u64;
                }
                StreamId::Stderr => {
                    stderr.write_all(&frame.payload)?;
                    stderr.flush()?;
                    stats.stderr_bytes += frame.payload.len() as u64;
                }
            }
        }
        Ok(stats)
    }

    /// Reader over stdout only; stderr frames are skipped.
    pub fn stdout_reader(self) -> StdoutReader<R> {
        StdoutReader {
            demux: self,
            pending: Vec::new(),
            offset: 0,
        }
    }
}

impl<R> fmt::Debug for StreamDemultiplexer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamDemultiplexer")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

pub struct StdoutReader<R> {
    demux: StreamDemultiplexer<R>,
    pending: Vec<u8>,
    offset: usize,
}

impl<R: Read> Read for StdoutReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.offset == self.pending.len() {
            match self.demux.next_frame()? {
                None => return Ok(0),
                Some(Frame {
                    stream: StreamId::Stderr,
                    ..
                }) => continue,
                Some(frame) => {
                    self.pending = frame.payload;
                    self.offset = 0;
                }
            }
        }
        let n = buf.len().min(self.pending.len() - self.offset);
        buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

/// Fills `buf` as far as the stream allows. Returns the byte count, which is
/// short only at end of stream.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Encodes one multiplexed frame. Used by engines and test doubles.
pub fn encode_frame(stream: StreamId, payload: &[u8]) -> io::Result<Vec<u8>> {
    let length = u32::try_from(payload.len())
        .map_err(|_| FrameError::violation("frame payload exceeds u32::MAX bytes"))?;
    let id = match stream {
        StreamId::Stdin => 0,
        StreamId::Stdout => 1,
        StreamId::Stderr => 2,
    };
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&[id, 0, 0, 0]);
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}
