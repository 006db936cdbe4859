//! Mock container engine for exercising the client without a real daemon.
//!
//! The MockEngine listens on a Unix socket inside a temporary directory,
//! parses each HTTP/1.1 request, records it, and answers with a scripted
//! response chosen by method and path. Responses are written as raw bytes
//! so framing edge cases can be reproduced exactly.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::io::Write;
use std::os::unix::net::UnixListener;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

use dockwire_http::encode_frame;
use dockwire_http::ChunkedReader;
use dockwire_http::StreamId;
use serde_json::json;
use serde_json::Value;
use tempfile::TempDir;

/// One request as the engine saw it. `path` has the version prefix and the
/// query string removed; `target` is the raw request target.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("request body is not JSON")
    }

    pub fn query(&self) -> HashMap<String, String> {
        let query = self.target.split_once('?').map(|(_, q)| q).unwrap_or("");
        url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect()
    }
}

/// Scripted answer for one route.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// JSON body framed by Content-Length
    Json { status: u16, body: Value },
    /// Empty body with Content-Length: 0
    Empty { status: u16 },
    /// Plain text body framed by Content-Length
    Text { status: u16, body: String },
    /// Exact response bytes; the connection stays open afterwards
    Raw(Vec<u8>),
    /// Exact response bytes, then the engine closes the connection
    RawThenClose(Vec<u8>),
    /// 101 upgrade followed by `output`. With `echo_stdin`, everything the
    /// client writes until it half-closes is sent back as one stdout frame.
    Hijack {
        content_type: &'static str,
        output: Vec<u8>,
        echo_stdin: bool,
    },
    /// Different responses on successive calls; the last one repeats
    Sequence(Vec<MockResponse>),
}

impl MockResponse {
    pub fn ok(body: Value) -> Self {
        MockResponse::Json { status: 200, body }
    }

    pub fn error(status: u16, message: &str) -> Self {
        MockResponse::Json {
            status,
            body: json!({ "message": message }),
        }
    }

    /// Chunked response carrying `chunks` as separate chunks.
    pub fn chunked(content_type: &str, chunks: &[&[u8]]) -> Self {
        let mut raw = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nTransfer-Encoding: chunked\r\n\r\n"
        )
        .into_bytes();
        for chunk in chunks {
            raw.extend(format!("{:x}\r\n", chunk.len()).into_bytes());
            raw.extend_from_slice(chunk);
            raw.extend_from_slice(b"\r\n");
        }
        raw.extend_from_slice(b"0\r\n\r\n");
        MockResponse::Raw(raw)
    }
}

type Routes = HashMap<(String, String), MockResponse>;

pub struct MockEngine {
    _temp_dir: TempDir,
    socket_path: PathBuf,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    routes: Arc<Mutex<Routes>>,
    sequence_counters: Arc<Mutex<HashMap<(String, String), usize>>>,
    connections: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

impl MockEngine {
    pub fn start() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let socket_path = temp_dir.path().join("engine.sock");
        let listener = UnixListener::bind(&socket_path).expect("Failed to bind mock socket");

        let engine = Self {
            _temp_dir: temp_dir,
            socket_path,
            requests: Arc::new(Mutex::new(Vec::new())),
            routes: Arc::new(Mutex::new(HashMap::new())),
            sequence_counters: Arc::new(Mutex::new(HashMap::new())),
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
        };

        engine.set_response(
            "GET",
            "/version",
            MockResponse::ok(json!({
                "Version": "24.0.7",
                "ApiVersion": "1.43",
                "MinAPIVersion": "1.12",
                "Os": "linux",
                "Arch": "amd64",
                "KernelVersion": "6.5.0"
            })),
        );
        engine.set_response(
            "GET",
            "/_ping",
            MockResponse::Text {
                status: 200,
                body: "OK".to_string(),
            },
        );

        let requests = Arc::clone(&engine.requests);
        let routes = Arc::clone(&engine.routes);
        let counters = Arc::clone(&engine.sequence_counters);
        let connections = Arc::clone(&engine.connections);
        let shutdown = Arc::clone(&engine.shutdown);

        thread::spawn(move || {
            for stream in listener.incoming() {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                connections.fetch_add(1, Ordering::SeqCst);
                let requests = Arc::clone(&requests);
                let routes = Arc::clone(&routes);
                let counters = Arc::clone(&counters);
                thread::spawn(move || serve(stream, requests, routes, counters));
            }
        });

        engine
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Address in `DOCKER_HOST` form.
    pub fn host(&self) -> String {
        format!("unix://{}", self.socket_path.display())
    }

    pub fn set_response(&self, method: &str, path: &str, response: MockResponse) {
        self.routes
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), response);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Unblocks the accept loop so it sees the flag.
        let _ = UnixStream::connect(&self.socket_path);
    }
}

fn serve(
    stream: UnixStream,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    routes: Arc<Mutex<Routes>>,
    counters: Arc<Mutex<HashMap<(String, String), usize>>>,
) {
    let Ok(mut writer) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(stream);

    while let Some(request) = read_request(&mut reader) {
        let key = (request.method.clone(), request.path.clone());
        requests.lock().unwrap().push(request);

        let response = {
            let routes = routes.lock().unwrap();
            match routes.get(&key) {
                Some(MockResponse::Sequence(items)) if !items.is_empty() => {
                    let mut counters = counters.lock().unwrap();
                    let index = counters.entry(key.clone()).or_insert(0);
                    let item = items[(*index).min(items.len() - 1)].clone();
                    *index += 1;
                    item
                }
                Some(response) => response.clone(),
                None => MockResponse::error(404, "page not found"),
            }
        };

        if !respond(&mut reader, &mut writer, response) {
            return;
        }
    }
}

/// Writes one response. Returns whether the connection stays open.
fn respond(reader: &mut BufReader<UnixStream>, writer: &mut UnixStream, response: MockResponse) -> bool {
    let result = match response {
        MockResponse::Json { status, body } => {
            let body = body.to_string();
            writer.write_all(
                format!(
                    "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                    body.len()
                )
                .as_bytes(),
            )
        }
        MockResponse::Empty { status } => writer.write_all(
            format!("HTTP/1.1 {status} Mock\r\nContent-Length: 0\r\n\r\n").as_bytes(),
        ),
        MockResponse::Text { status, body } => writer.write_all(
            format!(
                "HTTP/1.1 {status} Mock\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            )
            .as_bytes(),
        ),
        MockResponse::Raw(bytes) => writer.write_all(&bytes),
        MockResponse::RawThenClose(bytes) => {
            let _ = writer.write_all(&bytes);
            return false;
        }
        MockResponse::Hijack {
            content_type,
            output,
            echo_stdin,
        } => {
            let head = format!(
                "HTTP/1.1 101 UPGRADED\r\nContent-Type: {content_type}\r\nConnection: Upgrade\r\nUpgrade: tcp\r\n\r\n"
            );
            let _ = writer.write_all(head.as_bytes());
            let _ = writer.write_all(&output);
            if echo_stdin {
                let mut input = Vec::new();
                let _ = reader.read_to_end(&mut input);
                if let Ok(frame) = encode_frame(StreamId::Stdout, &input) {
                    let _ = writer.write_all(&frame);
                }
            }
            return false;
        }
        MockResponse::Sequence(_) => writer.write_all(b"HTTP/1.1 500 Mock\r\nContent-Length: 0\r\n\r\n"),
    };
    result.is_ok()
}

fn read_request(reader: &mut BufReader<UnixStream>) -> Option<RecordedRequest> {
    let mut line = String::new();
    if reader.read_line(&mut line).ok()? == 0 {
        return None;
    }
    let mut parts = line.trim_end().split(' ');
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            return None;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':')?;
        headers.push((name.to_string(), value.trim().to_string()));
    }

    let header = |name: &str| {
        headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    };

    let mut body = Vec::new();
    if header("Transfer-Encoding").is_some_and(|v| v.eq_ignore_ascii_case("chunked")) {
        ChunkedReader::new(&mut *reader).read_to_end(&mut body).ok()?;
    } else if let Some(length) = header("Content-Length").and_then(|v| v.parse::<u64>().ok()) {
        (&mut *reader).take(length).read_to_end(&mut body).ok()?;
    }

    let path = strip_version(target.split('?').next().unwrap_or(""));
    Some(RecordedRequest {
        method,
        target,
        path,
        headers,
        body,
    })
}

fn strip_version(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("/v") {
        if let Some((version, tail)) = rest.split_once('/') {
            if !version.is_empty() && version.chars().all(|c| c.is_ascii_digit() || c == '.') {
                return format!("/{tail}");
            }
        }
    }
    path.to_string()
}
