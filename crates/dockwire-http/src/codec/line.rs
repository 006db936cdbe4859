use std::io;
use std::io::BufRead;

use crate::error::FrameError;

/// Reads one CRLF-terminated line and returns it without the terminator.
///
/// `Ok(None)` means the stream ended before the first byte of the line. A
/// line ending in a bare LF is rejected, as is a stream that ends mid-line.
pub(crate) fn read_line<R: BufRead + ?Sized>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line)?;
    if n == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        return Err(FrameError::truncated(format!(
            "stream ended inside a line after {} bytes",
            line.len()
        )));
    }
    line.pop();
    if line.pop() != Some(b'\r') {
        return Err(FrameError::broken("line terminated by bare LF"));
    }
    Ok(Some(line))
}
