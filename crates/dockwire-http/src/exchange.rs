//! Request/response exchange over one owned stream.

use std::io;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;

use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::warn;

use crate::classify::classify;
use crate::codec::copy_chunked;
use crate::codec::ChunkedReader;
use crate::codec::ContentLengthReader;
use crate::demux::StreamDemultiplexer;
use crate::demux::StreamMode;
use crate::error::WireError;
use crate::request::Body;
use crate::request::Method;
use crate::request::Request;
use crate::request::JSON_CONTENT_TYPE;
use crate::response::read_head;
use crate::response::BodyFraming;
use crate::response::Headers;
use crate::response::ResponseHead;
use crate::Result;

/// Headers derived from the body; caller values are dropped.
const FRAMING_HEADERS: [&str; 3] = ["Host", "Content-Length", "Transfer-Encoding"];

/// HTTP/1.1 over one exclusively owned stream, one request in flight.
///
/// The exchange stays usable for another request only after the previous
/// response body was read to its framing end on a connection the engine
/// keeps open. Anything else poisons it and the owner has to reconnect.
pub struct HttpExchange<S: Read + Write> {
    reader: BufReader<S>,
    host: String,
    reusable: bool,
    in_flight: Option<Method>,
}

impl<S: Read + Write> HttpExchange<S> {
    pub fn new(stream: S, host: impl Into<String>) -> Self {
        Self {
            reader: BufReader::new(stream),
            host: host.into(),
            reusable: true,
            in_flight: None,
        }
    }

    pub fn is_reusable(&self) -> bool {
        self.reusable
    }

    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Sends `request` and returns the response once its head is read.
    ///
    /// Failed statuses are classified before returning, so a failure never
    /// hands back a body.
    pub fn request(&mut self, request: Request) -> Result<Response<'_, S>> {
        self.send(request)?;
        self.receive()
    }

    /// Writes `request` in full without waiting for the response. Pair with
    /// [`HttpExchange::receive`].
    pub fn send(&mut self, request: Request) -> Result<()> {
        if self.in_flight.is_some() {
            return Err(WireError::ProtocolViolation(
                "a request is already in flight on this connection".to_string(),
            ));
        }
        if !self.reusable {
            warn!("Exchange was not left on a response boundary");
            return Err(WireError::ProtocolViolation(
                "connection is not reusable; reconnect before the next request".to_string(),
            ));
        }
        // Cleared until a response body is read to its end.
        self.reusable = false;

        let method = request.method();
        debug!(method = %method, target = request.target(), "Sending request");
        let mut writer = BufWriter::new(self.reader.get_mut());
        write_request(&mut writer, &self.host, request)?;
        writer.flush()?;
        drop(writer);

        self.in_flight = Some(method);
        Ok(())
    }

    /// Reads the response to the request in flight.
    pub fn receive(&mut self) -> Result<Response<'_, S>> {
        let method = self.in_flight.take().ok_or_else(|| {
            WireError::ProtocolViolation("no request in flight on this connection".to_string())
        })?;
        let head = read_head(&mut self.reader)?;
        let framing = BodyFraming::select(method, &head)?;
        debug!(
            status = head.status,
            framing = framing.as_str(),
            "Response head"
        );

        let keep_alive = head.status != 101
            && !head.closes_connection()
            && framing != BodyFraming::RawUntilClose;
        let mut response = Response {
            body: BodyReader::new(framing, &mut self.reader),
            head,
            reusable: &mut self.reusable,
            keep_alive,
        };

        if response.head.is_failure() {
            let mut body = Vec::new();
            if let Err(e) = response.read_to_end(&mut body) {
                debug!(error = %e, "Failed to read error body");
            }
            if let Some(err) = classify(&response.head, &body) {
                return Err(err);
            }
        }

        Ok(response)
    }

    /// Sends an upgrade request and hands over the raw connection.
    ///
    /// The engine answers 101 (upgrade accepted) or 200 (legacy raw mode).
    /// Bytes already buffered past the response head stay in the returned
    /// reader.
    pub fn hijack(mut self, request: Request) -> Result<Hijacked<S>> {
        let method = request.method();
        let request = request
            .header("Connection", "Upgrade")
            .header("Upgrade", "tcp");
        self.send(request)?;
        self.in_flight = None;
        let head = read_head(&mut self.reader)?;
        debug!(status = head.status, "Hijack response");

        match head.status {
            101 | 200 => Ok(Hijacked {
                head,
                reader: self.reader,
            }),
            status if status >= 300 => {
                let framing = BodyFraming::select(method, &head)?;
                let mut body = Vec::new();
                if let Err(e) = BodyReader::new(framing, &mut self.reader).read_to_end(&mut body) {
                    debug!(error = %e, "Failed to read error body");
                }
                Err(classify(&head, &body).unwrap_or_else(|| WireError::RequestFailed {
                    status,
                    message: status.to_string(),
                }))
            }
            status => Err(WireError::ProtocolViolation(format!(
                "engine answered {status} to a hijack request"
            ))),
        }
    }
}

/// Writes the request line, headers and framed body.
pub fn write_request<W: Write>(out: &mut W, host: &str, request: Request) -> Result<()> {
    request.validate()?;
    let Request {
        method,
        target,
        headers,
        body,
    } = request;

    write!(out, "{method} {target} HTTP/1.1\r\n")?;
    write!(out, "Host: {host}\r\n")?;

    let mut has_content_type = false;
    for (name, value) in &headers {
        if FRAMING_HEADERS
            .iter()
            .any(|framing| framing.eq_ignore_ascii_case(name))
        {
            continue;
        }
        has_content_type |= name.eq_ignore_ascii_case("Content-Type");
        write!(out, "{name}: {value}\r\n")?;
    }
    if !body.is_empty() && !has_content_type {
        write!(out, "Content-Type: {JSON_CONTENT_TYPE}\r\n")?;
    }

    match body {
        Body::Empty if method.expects_body() => out.write_all(b"Content-Length: 0\r\n\r\n")?,
        Body::Empty => out.write_all(b"\r\n")?,
        Body::Bytes(bytes) => {
            write!(out, "Content-Length: {}\r\n\r\n", bytes.len())?;
            out.write_all(&bytes)?;
        }
        Body::Stream(mut source) => {
            out.write_all(b"Transfer-Encoding: chunked\r\n\r\n")?;
            let (_, sent) = copy_chunked(&mut source, &mut *out)?;
            debug!(bytes = sent, "Streamed chunked body");
        }
    }
    out.flush()?;
    Ok(())
}

enum BodyReader<'a, S> {
    Fixed(ContentLengthReader<&'a mut BufReader<S>>),
    Chunked(ChunkedReader<&'a mut BufReader<S>>),
    Raw(&'a mut BufReader<S>),
}

impl<'a, S: Read> BodyReader<'a, S> {
    fn new(framing: BodyFraming, reader: &'a mut BufReader<S>) -> Self {
        match framing {
            BodyFraming::FixedLength(length) => {
                BodyReader::Fixed(ContentLengthReader::new(reader, length))
            }
            BodyFraming::Chunked => BodyReader::Chunked(ChunkedReader::new(reader)),
            BodyFraming::RawUntilClose => BodyReader::Raw(reader),
        }
    }

    fn is_finished(&self) -> bool {
        match self {
            BodyReader::Fixed(reader) => reader.is_finished(),
            BodyReader::Chunked(reader) => reader.is_eof(),
            BodyReader::Raw(_) => false,
        }
    }
}

impl<S: Read> Read for BodyReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            BodyReader::Fixed(reader) => reader.read(buf),
            BodyReader::Chunked(reader) => reader.read(buf),
            BodyReader::Raw(reader) => reader.read(buf),
        }
    }
}

/// A successful response. Reading it yields the decoded body.
///
/// Dropping it before the body is exhausted leaves the exchange unusable.
pub struct Response<'a, S: Read + Write> {
    head: ResponseHead,
    body: BodyReader<'a, S>,
    reusable: &'a mut bool,
    keep_alive: bool,
}

impl<'a, S: Read + Write> Response<'a, S> {
    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn status(&self) -> u16 {
        self.head.status
    }

    pub fn headers(&self) -> &Headers {
        &self.head.headers
    }

    pub fn bytes(mut self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        self.read_to_end(&mut body)?;
        Ok(body)
    }

    pub fn text(self) -> Result<String> {
        let body = self.bytes()?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        let body = self.bytes()?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Lazily decodes a sequence of JSON values, as sent by progress
    /// endpoints. Ends with the body framing.
    pub fn json_stream<T: DeserializeOwned>(self) -> JsonStream<'a, S, T> {
        JsonStream {
            inner: serde_json::Deserializer::from_reader(self).into_iter(),
            done: false,
        }
    }

    /// Reads and drops the rest of the body so the exchange can be reused.
    pub fn discard(mut self) -> Result<u64> {
        Ok(io::copy(&mut self, &mut io::sink())?)
    }
}

impl<S: Read + Write> Read for Response<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

impl<S: Read + Write> Drop for Response<'_, S> {
    fn drop(&mut self) {
        *self.reusable = self.keep_alive && self.body.is_finished();
    }
}

/// Iterator over JSON records of a streamed body.
pub struct JsonStream<'a, S: Read + Write, T> {
    inner: serde_json::StreamDeserializer<'static, serde_json::de::IoRead<Response<'a, S>>, T>,
    done: bool,
}

impl<S: Read + Write, T: DeserializeOwned> Iterator for JsonStream<'_, S, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next()? {
            Ok(value) => Some(Ok(value)),
            Err(e) => {
                self.done = true;
                Some(Err(json_stream_error(e)))
            }
        }
    }
}

fn json_stream_error(err: serde_json::Error) -> WireError {
    if err.is_io() {
        WireError::from(io::Error::from(err))
    } else if err.is_eof() {
        WireError::BrokenFrame(format!("stream ended inside a JSON record: {err}"))
    } else {
        WireError::Json(err)
    }
}

/// A connection taken over for raw bidirectional streaming.
pub struct Hijacked<S> {
    head: ResponseHead,
    reader: BufReader<S>,
}

impl<S: Read + Write> Hijacked<S> {
    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    pub fn stream_mode(&self, tty: bool) -> StreamMode {
        StreamMode::negotiate(self.head.content_type(), tty)
    }

    pub fn into_parts(self) -> (ResponseHead, BufReader<S>) {
        (self.head, self.reader)
    }

    pub fn demultiplexer(self, tty: bool) -> StreamDemultiplexer<BufReader<S>> {
        let mode = self.stream_mode(tty);
        debug!(mode = ?mode, "Connection hijacked");
        StreamDemultiplexer::new(self.reader, mode)
    }
}

impl<S: Read + Write> Write for Hijacked<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.reader.get_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.reader.get_mut().flush()
    }
}
