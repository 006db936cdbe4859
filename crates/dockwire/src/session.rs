//! Interactive attach and exec sessions over a hijacked connection.

use std::io;
use std::io::BufReader;
use std::io::Read;
use std::io::Write;
use std::thread;

use tracing::debug;
use tracing::warn;

use dockwire_http::Connection;
use dockwire_http::CopyStats;
use dockwire_http::Hijacked;
use dockwire_http::StreamDemultiplexer;
use dockwire_http::StreamMode;
use dockwire_http::WireError;

/// One hijacked connection split into its two directions.
///
/// The write half carries raw stdin bytes; the read half is decoded by the
/// demultiplexer. Over TLS both handles drive the same session state.
pub struct AttachSession {
    stdin: Option<Connection>,
    output: StreamDemultiplexer<BufReader<Connection>>,
}

impl AttachSession {
    pub(crate) fn new(
        hijacked: Hijacked<Connection>,
        tty: bool,
        with_stdin: bool,
    ) -> Result<Self, WireError> {
        let stdin = if with_stdin {
            Some(hijacked.get_ref().try_clone()?)
        } else {
            None
        };
        Ok(Self {
            stdin,
            output: hijacked.demultiplexer(tty),
        })
    }

    pub fn mode(&self) -> StreamMode {
        self.output.mode()
    }

    /// Raw write handle for stdin bytes, if stdin was requested.
    pub fn stdin(&mut self) -> Option<&mut Connection> {
        self.stdin.as_mut()
    }

    /// Half-closes the write direction so the process sees end of input.
    /// Output keeps flowing.
    pub fn close_stdin(&mut self) -> Result<(), WireError> {
        match self.stdin.take() {
            Some(mut conn) => conn.shutdown_write(),
            None => Ok(()),
        }
    }

    pub fn output(&mut self) -> &mut StreamDemultiplexer<BufReader<Connection>> {
        &mut self.output
    }

    /// Runs the session to completion.
    ///
    /// `input` is copied to the engine on a dedicated thread and the write
    /// direction is half-closed when it ends. Output is copied on the calling
    /// thread until the engine closes the stream. A stdin thread still
    /// blocked on local input at that point is left behind.
    pub fn pump<I, O, E>(
        self,
        input: I,
        stdout: &mut O,
        stderr: &mut E,
    ) -> Result<CopyStats, WireError>
    where
        I: Read + Send + 'static,
        O: Write,
        E: Write,
    {
        let Self { stdin, mut output } = self;

        let writer = match stdin {
            Some(mut conn) => {
                let handle = thread::Builder::new()
                    .name("dockwire-stdin".to_string())
                    .spawn(move || -> Result<u64, WireError> {
                        let mut input = input;
                        let copied = io::copy(&mut input, &mut conn)?;
                        conn.shutdown_write()?;
                        Ok(copied)
                    })?;
                Some(handle)
            }
            None => None,
        };

        let stats = output.copy_to(stdout, stderr)?;
        debug!(
            stdout = stats.stdout_bytes,
            stderr = stats.stderr_bytes,
            frames = stats.frames,
            "Session output ended"
        );

        if let Some(handle) = writer {
            if handle.is_finished() {
                match handle.join() {
                    Ok(Ok(copied)) => debug!(bytes = copied, "Stdin forwarded"),
                    Ok(Err(e)) => debug!(error = %e, "Stdin copy stopped"),
                    Err(_) => warn!("Stdin thread panicked"),
                }
            } else {
                debug!("Stdin still open after output ended");
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockwire_http::encode_frame;
    use dockwire_http::HttpExchange;
    use dockwire_http::Request;
    use dockwire_http::StreamId;
    use std::io::Cursor;
    use std::net::TcpListener;
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;

    use dockwire_http::Endpoint;
    use rustls::pki_types::CertificateDer;
    use rustls::pki_types::PrivatePkcs8KeyDer;

    fn read_head<S: Read>(stream: &mut S) -> String {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            if stream.read(&mut byte).unwrap() == 0 {
                break;
            }
            head.push(byte[0]);
        }
        String::from_utf8(head).unwrap()
    }

    /// Engine side: answers the upgrade, echoes stdin as one stdout frame
    /// once stdin is half-closed, then closes. Without `echo` it sends a
    /// greeting and closes right away.
    fn spawn_engine(mut server: UnixStream, echo: bool) -> thread::JoinHandle<String> {
        thread::spawn(move || serve_attach(&mut server, echo))
    }

    fn serve_attach<S: Read + Write>(server: &mut S, echo: bool) -> String {
        let head = read_head(server);
        server
            .write_all(
                b"HTTP/1.1 101 UPGRADED\r\n\
                  Content-Type: application/vnd.docker.multiplexed-stream\r\n\
                  Connection: Upgrade\r\nUpgrade: tcp\r\n\r\n",
            )
            .unwrap();
        server
            .write_all(&encode_frame(StreamId::Stderr, b"ready\n").unwrap())
            .unwrap();
        if !echo {
            return head;
        }
        let mut input = Vec::new();
        server.read_to_end(&mut input).unwrap();
        server
            .write_all(&encode_frame(StreamId::Stdout, &input).unwrap())
            .unwrap();
        head
    }

    /// Same engine behind TLS, with a self-signed certificate for
    /// `localhost`. Returns the port and a client context trusting it.
    fn spawn_tls_engine(echo: bool) -> (u16, dockwire_http::TlsContext, thread::JoinHandle<String>) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let key = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());
        let cert_der: CertificateDer<'static> = cert.cert.der().clone();

        let mut roots = rustls::RootCertStore::empty();
        roots.add(cert_der.clone()).unwrap();
        let client = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let server = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key.into())
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = Arc::new(server);
        let engine = thread::spawn(move || {
            let (sock, _) = listener.accept().unwrap();
            let conn = rustls::ServerConnection::new(server).unwrap();
            let mut tls = rustls::StreamOwned::new(conn, sock);
            serve_attach(&mut tls, echo)
        });
        (port, Arc::new(client), engine)
    }

    fn session(client: UnixStream, with_stdin: bool) -> AttachSession {
        let hijacked = HttpExchange::new(Connection::from(client), "docker")
            .hijack(Request::post("/containers/abc/attach?stream=1&stdin=1"))
            .unwrap();
        AttachSession::new(hijacked, false, with_stdin).unwrap()
    }

    #[test]
    fn test_pump_forwards_stdin_and_splits_output() {
        let (client, server) = UnixStream::pair().unwrap();
        let engine = spawn_engine(server, true);

        let session = session(client, true);
        assert_eq!(session.mode(), StreamMode::Multiplexed);

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let stats = session
            .pump(Cursor::new(b"ping".to_vec()), &mut stdout, &mut stderr)
            .unwrap();

        assert_eq!(stdout, b"ping");
        assert_eq!(stderr, b"ready\n");
        assert_eq!(stats.frames, 2);

        let head = engine.join().unwrap();
        assert!(head.starts_with("POST /containers/abc/attach?stream=1&stdin=1 HTTP/1.1\r\n"));
        assert!(head.contains("Upgrade: tcp\r\n"));
    }

    #[test]
    fn test_close_stdin_half_closes() {
        let (client, server) = UnixStream::pair().unwrap();
        let engine = spawn_engine(server, true);

        let mut session = session(client, true);
        session.stdin().unwrap().write_all(b"abc").unwrap();
        session.close_stdin().unwrap();
        assert!(session.stdin().is_none());

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        session.output().copy_to(&mut stdout, &mut stderr).unwrap();
        assert_eq!(stdout, b"abc");
        engine.join().unwrap();
    }

    #[test]
    fn test_output_only_session() {
        let (client, server) = UnixStream::pair().unwrap();
        let engine = spawn_engine(server, false);

        let session = session(client, false);
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let stats = session
            .pump(Cursor::new(b"ignored".to_vec()), &mut stdout, &mut stderr)
            .unwrap();
        assert!(stdout.is_empty());
        assert_eq!(stderr, b"ready\n");
        assert_eq!(stats.frames, 1);
        engine.join().unwrap();
    }

    #[test]
    fn test_tls_session_forwards_stdin() {
        let (port, context, engine) = spawn_tls_engine(true);
        let endpoint = Endpoint::tcp("localhost", port).with_tls(context).unwrap();
        let conn = Connection::open(&endpoint).unwrap();
        let hijacked = HttpExchange::new(conn, "localhost")
            .hijack(Request::post("/containers/abc/attach?stream=1&stdin=1"))
            .unwrap();
        let mut session = AttachSession::new(hijacked, false, true).unwrap();
        assert!(session.stdin().is_some_and(|conn| conn.is_tls()));

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let stats = session
            .pump(Cursor::new(b"over tls".to_vec()), &mut stdout, &mut stderr)
            .unwrap();

        assert_eq!(stdout, b"over tls");
        assert_eq!(stderr, b"ready\n");
        assert_eq!(stats.frames, 2);
        assert!(engine.join().unwrap().contains("Upgrade: tcp\r\n"));
    }
}
