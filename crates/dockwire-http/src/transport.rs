//! Byte-stream connections to the engine.

use std::io;
use std::io::Read;
use std::io::Write;
use std::net::Shutdown;
use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::ClientConnection;
use tracing::debug;
use tracing::trace;

use crate::endpoint::Endpoint;
use crate::endpoint::TlsContext;
use crate::error::WireError;

/// Ciphertext read from the socket per attempt.
const TLS_READ_CHUNK: usize = 16 * 1024;

/// One open socket to the engine. The owner is responsible for closing it,
/// which happens on drop.
pub enum Connection {
    Unix(UnixStream),
    Tcp(TcpStream),
    Tls(Box<TlsStream>),
}

impl Connection {
    /// Opens a connection. Fails immediately, without retry, when the socket
    /// path is missing, the peer refuses, or the TLS handshake fails.
    pub fn open(endpoint: &Endpoint) -> Result<Self, WireError> {
        match endpoint {
            Endpoint::Unix { path } => {
                if !path.exists() {
                    debug!(socket = %path.display(), "Engine socket missing");
                    return Err(WireError::connection_reason(
                        endpoint,
                        format!("socket {} does not exist", path.display()),
                    ));
                }
                debug!(socket = %path.display(), "Connecting to engine socket");
                let stream =
                    UnixStream::connect(path).map_err(|e| WireError::connection(endpoint, e))?;
                Ok(Connection::Unix(stream))
            }
            Endpoint::Tcp { host, port, tls } => {
                debug!(host = %host, port, tls = tls.is_some(), "Connecting to engine over TCP");
                let stream = TcpStream::connect((host.as_str(), *port))
                    .map_err(|e| WireError::connection(endpoint, e))?;
                match tls {
                    None => Ok(Connection::Tcp(stream)),
                    Some(context) => handshake(endpoint, host, context, stream),
                }
            }
        }
    }

    /// Independent handle on the same socket, used as the write half of an
    /// attach session. TLS handles share one session state.
    pub fn try_clone(&self) -> Result<Self, WireError> {
        match self {
            Connection::Unix(stream) => Ok(Connection::Unix(stream.try_clone()?)),
            Connection::Tcp(stream) => Ok(Connection::Tcp(stream.try_clone()?)),
            Connection::Tls(stream) => Ok(Connection::Tls(Box::new(stream.try_clone()?))),
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Connection::Tls(_))
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), WireError> {
        match self {
            Connection::Unix(stream) => stream.set_read_timeout(timeout)?,
            Connection::Tcp(stream) => stream.set_read_timeout(timeout)?,
            Connection::Tls(stream) => stream.sock.set_read_timeout(timeout)?,
        }
        Ok(())
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<(), WireError> {
        match self {
            Connection::Unix(stream) => stream.set_write_timeout(timeout)?,
            Connection::Tcp(stream) => stream.set_write_timeout(timeout)?,
            Connection::Tls(stream) => stream.sock.set_write_timeout(timeout)?,
        }
        Ok(())
    }

    /// Half-closes the write direction. The read direction stays open so
    /// remaining output can still be drained.
    pub fn shutdown_write(&mut self) -> Result<(), WireError> {
        match self {
            Connection::Unix(stream) => stream.shutdown(Shutdown::Write)?,
            Connection::Tcp(stream) => stream.shutdown(Shutdown::Write)?,
            Connection::Tls(stream) => stream.shutdown_write()?,
        }
        Ok(())
    }

    pub fn shutdown(&self) -> Result<(), WireError> {
        match self {
            Connection::Unix(stream) => stream.shutdown(Shutdown::Both)?,
            Connection::Tcp(stream) => stream.shutdown(Shutdown::Both)?,
            Connection::Tls(stream) => stream.sock.shutdown(Shutdown::Both)?,
        }
        Ok(())
    }
}

fn handshake(
    endpoint: &Endpoint,
    host: &str,
    context: &TlsContext,
    mut stream: TcpStream,
) -> Result<Connection, WireError> {
    let server_name = ServerName::try_from(host.to_string()).map_err(|e| {
        WireError::connection_reason(endpoint, format!("invalid TLS server name: {e}"))
    })?;
    let mut conn = ClientConnection::new(Arc::clone(context), server_name)
        .map_err(|e| WireError::connection_reason(endpoint, format!("TLS setup failed: {e}")))?;

    while conn.is_handshaking() {
        conn.complete_io(&mut stream).map_err(|e| {
            WireError::connection_reason(endpoint, format!("TLS handshake failed: {e}"))
        })?;
    }
    debug!(host = %host, "TLS handshake complete");

    Ok(Connection::Tls(Box::new(TlsStream::new(conn, stream))))
}

/// A TLS session over TCP that can be split into handles used from
/// different threads.
///
/// Each handle owns a clone of the socket. The session state sits behind a
/// shared lock, which is never held while waiting for the peer to send.
pub struct TlsStream {
    conn: Arc<Mutex<ClientConnection>>,
    sock: TcpStream,
    /// Ciphertext read from the socket but not yet handed to the session.
    pending: Vec<u8>,
    eof: bool,
}

impl TlsStream {
    fn new(conn: ClientConnection, sock: TcpStream) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            sock,
            pending: Vec::new(),
            eof: false,
        }
    }

    fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            conn: Arc::clone(&self.conn),
            sock: self.sock.try_clone()?,
            pending: Vec::new(),
            eof: false,
        })
    }

    fn shutdown_write(&mut self) -> io::Result<()> {
        {
            let mut conn = lock_session(&self.conn)?;
            conn.send_close_notify();
            write_records(&mut conn, &mut self.sock)?;
        }
        self.sock.shutdown(Shutdown::Write)
    }
}

fn lock_session(conn: &Mutex<ClientConnection>) -> io::Result<MutexGuard<'_, ClientConnection>> {
    conn.lock()
        .map_err(|_| io::Error::other("TLS session lock poisoned"))
}

/// Sends every TLS record the session has queued.
fn write_records(conn: &mut ClientConnection, sock: &mut TcpStream) -> io::Result<()> {
    while conn.wants_write() {
        conn.write_tls(sock)?;
    }
    Ok(())
}

impl Read for TlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            {
                let mut conn = lock_session(&self.conn)?;
                match conn.reader().read(buf) {
                    Ok(n) => return Ok(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    // Engines often close without close_notify; treat it as EOF.
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(0),
                    Err(e) => return Err(e),
                }
                if self.eof {
                    return Ok(0);
                }
                if !self.pending.is_empty() {
                    let mut incoming = self.pending.as_slice();
                    let consumed = conn.read_tls(&mut incoming)?;
                    self.pending.drain(..consumed);
                    conn.process_new_packets()
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    write_records(&mut conn, &mut self.sock)?;
                    continue;
                }
            }

            let mut chunk = [0u8; TLS_READ_CHUNK];
            let n = self.sock.read(&mut chunk)?;
            trace!(bytes = n, "TLS ciphertext received");
            if n == 0 {
                let mut conn = lock_session(&self.conn)?;
                conn.read_tls(&mut io::empty())?;
                conn.process_new_packets()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                self.eof = true;
                continue;
            }
            self.pending.extend_from_slice(&chunk[..n]);
        }
    }
}

impl Write for TlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut conn = lock_session(&self.conn)?;
        let n = conn.writer().write(buf)?;
        write_records(&mut conn, &mut self.sock)?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut conn = lock_session(&self.conn)?;
        conn.writer().flush()?;
        write_records(&mut conn, &mut self.sock)?;
        self.sock.flush()
    }
}

impl From<UnixStream> for Connection {
    fn from(stream: UnixStream) -> Self {
        Connection::Unix(stream)
    }
}

impl From<TcpStream> for Connection {
    fn from(stream: TcpStream) -> Self {
        Connection::Tcp(stream)
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Unix(stream) => stream.read(buf),
            Connection::Tcp(stream) => stream.read(buf),
            Connection::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Unix(stream) => stream.write(buf),
            Connection::Tcp(stream) => stream.write(buf),
            Connection::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Connection::Unix(stream) => stream.flush(),
            Connection::Tcp(stream) => stream.flush(),
            Connection::Tls(stream) => stream.flush(),
        }
    }
}
