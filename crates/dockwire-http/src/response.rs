//! Response heads and body framing selection.

use std::collections::hash_map;
use std::collections::HashMap;
use std::io::BufRead;

use crate::codec::read_line;
use crate::error::WireError;
use crate::request::Method;
use crate::Result;

/// Response header map.
///
/// Names are case-sensitive and a repeated name keeps the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    map: HashMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.map.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, String> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Status code and headers of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Headers,
}

impl ResponseHead {
    /// Hundreds digit of 3 or more.
    pub fn is_failure(&self) -> bool {
        self.status >= 300
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type")
    }

    pub fn closes_connection(&self) -> bool {
        self.headers
            .get("Connection")
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("close"))
    }
}

/// How the response body is delimited. Exactly one applies per response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    FixedLength(u64),
    Chunked,
    RawUntilClose,
}

impl BodyFraming {
    pub fn select(method: Method, head: &ResponseHead) -> Result<Self> {
        if method == Method::Head
            || (100..200).contains(&head.status)
            || head.status == 204
            || head.status == 304
        {
            return Ok(BodyFraming::FixedLength(0));
        }

        if let Some(value) = head.headers.get("Content-Length") {
            let length = value.trim().parse::<u64>().map_err(|_| {
                WireError::ProtocolViolation(format!("invalid Content-Length {value:?}"))
            })?;
            return Ok(BodyFraming::FixedLength(length));
        }

        if let Some(value) = head.headers.get("Transfer-Encoding") {
            let last = value.rsplit(',').next().unwrap_or_default().trim();
            if last.eq_ignore_ascii_case("chunked") {
                return Ok(BodyFraming::Chunked);
            }
            return Err(WireError::ProtocolViolation(format!(
                "unsupported Transfer-Encoding {value:?}"
            )));
        }

        Ok(BodyFraming::RawUntilClose)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BodyFraming::FixedLength(_) => "fixed_length",
            BodyFraming::Chunked => "chunked",
            BodyFraming::RawUntilClose => "raw_until_close",
        }
    }
}

/// Reads the status line and headers up to and including the blank line.
pub(crate) fn read_head<R: BufRead + ?Sized>(reader: &mut R) -> Result<ResponseHead> {
    let status_line = read_line(reader)?.ok_or_else(|| {
        WireError::BrokenFrame("connection closed before the response status line".to_string())
    })?;
    let status = parse_status_line(&status_line)?;

    let mut headers = Headers::new();
    loop {
        let line = read_line(reader)?.ok_or_else(|| {
            WireError::BrokenFrame("connection closed inside the response headers".to_string())
        })?;
        if line.is_empty() {
            break;
        }
        let (name, value) = parse_header_line(&line)?;
        headers.insert(name, value);
    }

    Ok(ResponseHead { status, headers })
}

fn parse_status_line(line: &[u8]) -> Result<u16> {
    let text = String::from_utf8_lossy(line);
    let mut parts = text.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(WireError::ProtocolViolation(format!(
            "invalid status line {text:?}"
        )));
    }
    let code = parts.next().unwrap_or_default();
    if code.len() != 3 {
        return Err(WireError::ProtocolViolation(format!(
            "invalid status code in {text:?}"
        )));
    }
    code.parse::<u16>()
        .map_err(|_| WireError::ProtocolViolation(format!("invalid status code in {text:?}")))
}

fn parse_header_line(line: &[u8]) -> Result<(String, String)> {
    let text = String::from_utf8_lossy(line);
    if let Some((name, value)) = text.split_once(": ") {
        return Ok((name.to_string(), value.to_string()));
    }
    // Tolerate peers that omit the space after the colon.
    match text.split_once(':') {
        Some((name, value)) if !name.is_empty() => {
            Ok((name.to_string(), value.trim_start().to_string()))
        }
        _ => Err(WireError::ProtocolViolation(format!(
            "malformed header line {text:?}"
        ))),
    }
}
