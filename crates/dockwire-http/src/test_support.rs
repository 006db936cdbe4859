use std::io;
use std::io::Read;

/// Source that hands out at most `step` bytes per read call.
pub(crate) struct Trickle<R> {
    inner: R,
    step: usize,
}

impl<R: Read> Trickle<R> {
    pub(crate) fn new(inner: R, step: usize) -> Self {
        Self {
            inner,
            step: step.max(1),
        }
    }
}

impl<R: Read> Read for Trickle<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len().min(self.step);
        self.inner.read(&mut buf[..len])
    }
}

pub(crate) fn trickle(bytes: &[u8], step: usize) -> Trickle<io::Cursor<Vec<u8>>> {
    Trickle::new(io::Cursor::new(bytes.to_vec()), step)
}

/// In-memory duplex stream: reads come from a scripted response, writes are
/// captured for inspection.
pub(crate) struct Duplex {
    input: Trickle<io::Cursor<Vec<u8>>>,
    pub(crate) written: Vec<u8>,
}

impl Duplex {
    pub(crate) fn new(response: &[u8]) -> Self {
        Self::trickling(response, usize::MAX)
    }

    pub(crate) fn trickling(response: &[u8], step: usize) -> Self {
        Self {
            input: trickle(response, step),
            written: Vec::new(),
        }
    }

    pub(crate) fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }
}

impl Read for Duplex {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl io::Write for Duplex {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
