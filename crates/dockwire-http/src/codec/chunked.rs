use std::io;
use std::io::BufRead;
use std::io::Read;
use std::io::Write;

use tracing::trace;

use super::line::read_line;
use crate::error::FrameError;

/// Block size used when streaming a request body of unknown length.
pub const CHUNK_SIZE: usize = 4 * 1024;

const CRLF: &[u8] = b"\r\n";
const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Decodes an HTTP/1.1 chunked body.
///
/// Chunk headers are fetched lazily: a new size line is only read once the
/// current chunk is exhausted and the terminal chunk has not been seen. The
/// terminal zero-length chunk is never surfaced as data.
#[derive(Debug)]
pub struct ChunkedReader<R> {
    inner: R,
    remaining: u64,
    pending_crlf: bool,
    eof: bool,
}

impl<R: BufRead> ChunkedReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            remaining: 0,
            pending_crlf: false,
            eof: false,
        }
    }

    /// True once the terminal chunk and its trailer have been consumed.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn next_chunk(&mut self) -> io::Result<()> {
        if self.pending_crlf {
            expect_crlf(&mut self.inner)?;
            self.pending_crlf = false;
        }

        let line = read_line(&mut self.inner)?
            .ok_or_else(|| FrameError::truncated("stream ended before chunk size line"))?;
        let size = parse_chunk_size(&line)?;
        trace!(size, "Chunk header");

        if size == 0 {
            self.skip_trailer()?;
            self.eof = true;
        } else {
            self.remaining = size;
        }
        Ok(())
    }

    fn skip_trailer(&mut self) -> io::Result<()> {
        loop {
            match read_line(&mut self.inner)? {
                Some(line) if line.is_empty() => return Ok(()),
                Some(_) => continue,
                None => {
                    return Err(FrameError::truncated(
                        "stream ended before the end of the chunked body",
                    ));
                }
            }
        }
    }
}

impl<R: BufRead> Read for ChunkedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.eof || buf.is_empty() {
            return Ok(0);
        }
        if self.remaining == 0 {
            self.next_chunk()?;
            if self.eof {
                return Ok(0);
            }
        }

        let max = usize::try_from(self.remaining)
            .map(|remaining| remaining.min(buf.len()))
            .unwrap_or(buf.len());
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(FrameError::truncated(format!(
                "stream ended with {} chunk bytes outstanding",
                self.remaining
            )));
        }
        self.remaining -= n as u64;
        if self.remaining == 0 {
            self.pending_crlf = true;
        }
        Ok(n)
    }
}

fn parse_chunk_size(line: &[u8]) -> io::Result<u64> {
    let text = std::str::from_utf8(line)
        .map_err(|_| FrameError::broken("chunk size line is not ASCII"))?;
    // Chunk extensions (;name=value) carry nothing we use.
    let hex = text.split(';').next().unwrap_or_default().trim();
    if hex.is_empty() {
        return Err(FrameError::broken("empty chunk size line"));
    }
    u64::from_str_radix(hex, 16)
        .map_err(|_| FrameError::broken(format!("invalid chunk size {hex:?}")))
}

fn expect_crlf<R: Read>(reader: &mut R) -> io::Result<()> {
    let mut terminator = [0u8; 2];
    reader.read_exact(&mut terminator).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::truncated("stream ended before chunk terminator")
        } else {
            e
        }
    })?;
    if terminator != *CRLF {
        return Err(FrameError::broken(format!(
            "expected CRLF after chunk data, found {terminator:02x?}"
        )));
    }
    Ok(())
}

/// Encodes an outgoing body with chunked transfer encoding.
///
/// Every non-empty `write` becomes exactly one chunk. Empty writes emit
/// nothing, since a zero-length chunk would end the body. Call
/// [`ChunkedWriter::finish`] to write the terminal chunk.
#[derive(Debug)]
pub struct ChunkedWriter<W: Write> {
    inner: W,
}

impl<W: Write> ChunkedWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.inner.write_all(LAST_CHUNK)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for ChunkedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        trace!(size = buf.len(), "Writing chunk");
        write!(self.inner, "{:x}\r\n", buf.len())?;
        self.inner.write_all(buf)?;
        self.inner.write_all(CRLF)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Streams `source` into `sink` as a complete chunked body in blocks of at
/// most [`CHUNK_SIZE`] bytes. Returns the sink and the payload byte count.
pub fn copy_chunked<R: Read + ?Sized, W: Write>(source: &mut R, sink: W) -> io::Result<(W, u64)> {
    let mut writer = ChunkedWriter::new(sink);
    let mut block = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match source.read(&mut block) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&block[..n])?;
        total += n as u64;
    }
    Ok((writer.finish()?, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WireError;
    use crate::test_support::trickle;
    use proptest::prelude::*;
    use std::io::BufReader;
    use std::io::Cursor;

    fn decode(wire: &[u8]) -> Result<Vec<u8>, WireError> {
        let mut reader = ChunkedReader::new(Cursor::new(wire.to_vec()));
        let mut out = Vec::new();
        reader.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_decodes_wikipedia_example() {
        let wire = b"4\r\nWiki\r\n5\r\npedia\r\nE\r\n in\r\n\r\nchunks.\r\n0\r\n\r\n";
        let out = decode(wire).unwrap();
        assert_eq!(out, b"Wikipedia in\r\n\r\nchunks.");
    }

    #[test]
    fn test_leaves_following_bytes_untouched() {
        let wire = b"3\r\nabc\r\n0\r\n\r\nHTTP/1.1 200 OK\r\n";
        let mut reader = ChunkedReader::new(Cursor::new(wire.to_vec()));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert!(reader.is_eof());

        let mut rest = String::new();
        reader.into_inner().read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "HTTP/1.1 200 OK\r\n");
    }

    #[test]
    fn test_header_is_fetched_lazily() {
        // Only the first chunk is available; reading it must not block on or
        // fail for the missing next size line.
        let wire = b"5\r\nhello";
        let mut reader = ChunkedReader::new(Cursor::new(wire.to_vec()));
        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert!(!reader.is_eof());
    }

    #[test]
    fn test_ignores_extensions_and_trailers() {
        let wire = b"5;name=value\r\nhello\r\n0\r\nX-Trailer: yes\r\n\r\n";
        assert_eq!(decode(wire).unwrap(), b"hello");
    }

    #[test]
    fn test_uppercase_and_lowercase_hex() {
        let wire = b"a\r\n0123456789\r\nA\r\nabcdefghij\r\n0\r\n\r\n";
        assert_eq!(decode(wire).unwrap(), b"0123456789abcdefghij");
    }

    #[test]
    fn test_invalid_size_is_broken_frame() {
        let err = decode(b"zz\r\nhello\r\n0\r\n\r\n").unwrap_err();
        assert!(matches!(err, WireError::BrokenFrame(_)));
    }

    #[test]
    fn test_missing_crlf_after_data_is_broken_frame() {
        let err = decode(b"3\r\nabcXX0\r\n\r\n").unwrap_err();
        assert!(matches!(err, WireError::BrokenFrame(_)));
    }

    #[test]
    fn test_eof_mid_chunk_is_broken_frame() {
        let err = decode(b"10\r\nonly a few").unwrap_err();
        assert!(matches!(err, WireError::BrokenFrame(_)));
    }

    #[test]
    fn test_eof_before_terminal_chunk_is_broken_frame() {
        let err = decode(b"3\r\nabc\r\n").unwrap_err();
        assert!(matches!(err, WireError::BrokenFrame(_)));
    }

    #[test]
    fn test_bare_lf_size_line_is_broken_frame() {
        let err = decode(b"3\nabc\r\n0\r\n\r\n").unwrap_err();
        assert!(matches!(err, WireError::BrokenFrame(_)));
    }

    #[test]
    fn test_writer_frames_each_write() {
        let mut writer = ChunkedWriter::new(Vec::new());
        writer.write_all(b"Wiki").unwrap();
        writer.write_all(b"").unwrap();
        writer.write_all(&[b'x'; 26]).unwrap();
        let wire = writer.finish().unwrap();

        let mut expected = b"4\r\nWiki\r\n1a\r\n".to_vec();
        expected.extend_from_slice(&[b'x'; 26]);
        expected.extend_from_slice(b"\r\n0\r\n\r\n");
        assert_eq!(wire, expected);
    }

    #[test]
    fn test_copy_chunked_empty_source_writes_only_terminator() {
        let (wire, total) = copy_chunked(&mut Cursor::new(Vec::new()), Vec::new()).unwrap();
        assert_eq!(total, 0);
        assert_eq!(wire, LAST_CHUNK);
    }

    #[test]
    fn test_copy_chunked_splits_on_block_size() {
        let payload = vec![b'a'; CHUNK_SIZE + 10];
        let (wire, total) = copy_chunked(&mut Cursor::new(payload.clone()), Vec::new()).unwrap();
        assert_eq!(total, payload.len() as u64);
        assert!(wire.starts_with(b"1000\r\n"));
        assert_eq!(decode(&wire).unwrap(), payload);
    }

    proptest! {
        #[test]
        fn prop_round_trips_through_writer(
            blocks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..300), 0..8),
            step in 1usize..32,
        ) {
            let mut writer = ChunkedWriter::new(Vec::new());
            for block in &blocks {
                writer.write_all(block).unwrap();
            }
            let wire = writer.finish().unwrap();

            let mut reader = ChunkedReader::new(BufReader::with_capacity(7, trickle(&wire, step)));
            let mut out = Vec::new();
            reader.read_to_end(&mut out).unwrap();
            prop_assert_eq!(out, blocks.concat());
            prop_assert!(reader.is_eof());
        }

        #[test]
        fn prop_copy_chunked_round_trips(payload in proptest::collection::vec(any::<u8>(), 0..3 * CHUNK_SIZE)) {
            let (wire, _) = copy_chunked(&mut Cursor::new(payload.clone()), Vec::new()).unwrap();
            prop_assert_eq!(decode(&wire).unwrap(), payload);
        }
    }
}
