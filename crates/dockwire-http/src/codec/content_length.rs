use std::io;
use std::io::Read;

use crate::error::FrameError;

/// Bounds a stream to a declared number of bytes.
///
/// Reads never cross the boundary and end-of-stream is reported exactly when
/// the declared count has been delivered, however the source splits its
/// reads. A source that ends early yields a broken-frame error.
#[derive(Debug)]
pub struct ContentLengthReader<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> ContentLengthReader<R> {
    pub fn new(inner: R, length: u64) -> Self {
        Self {
            inner,
            remaining: length,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for ContentLengthReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let max = usize::try_from(self.remaining)
            .map(|remaining| remaining.min(buf.len()))
            .unwrap_or(buf.len());
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(FrameError::truncated(format!(
                "stream ended with {} of the declared body bytes outstanding",
                self.remaining
            )));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}
