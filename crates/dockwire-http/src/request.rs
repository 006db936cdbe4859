//! Outgoing requests.

use std::fmt;
use std::io::Read;

use serde::Serialize;

use crate::error::WireError;
use crate::Result;

/// Content type sent with a body when the caller did not choose one.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Whether an empty body should still be announced with
    /// `Content-Length: 0`.
    pub(crate) fn expects_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request payload.
pub enum Body {
    Empty,
    /// Length known up front; sent with `Content-Length`.
    Bytes(Vec<u8>),
    /// Length unknown; sent with chunked transfer encoding.
    Stream(Box<dyn Read + Send>),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Bytes(bytes) => bytes.is_empty(),
            Body::Stream(_) => false,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Body::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// One HTTP request, built per call and consumed by the exchange.
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) target: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Body,
}

impl Request {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::Get, target)
    }

    pub fn head(target: impl Into<String>) -> Self {
        Self::new(Method::Head, target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::new(Method::Post, target)
    }

    pub fn put(target: impl Into<String>) -> Self {
        Self::new(Method::Put, target)
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(Method::Delete, target)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Adds a header, replacing any earlier header with the same name
    /// (compared case-insensitively). Order of first insertion is kept.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => *slot = (name, value),
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Serializes `value` as the body with the JSON content type.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(value)?;
        Ok(self.header("Content-Type", JSON_CONTENT_TYPE).bytes(bytes))
    }

    pub fn bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.body = Body::Bytes(bytes.into());
        self
    }

    pub fn stream(mut self, reader: impl Read + Send + 'static) -> Self {
        self.body = Body::Stream(Box::new(reader));
        self
    }

    #[cfg(test)]
    pub(crate) fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    /// Rejects anything that would let a value break out of its line.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.target.is_empty() || !self.target.starts_with('/') {
            return Err(WireError::InvalidInput(format!(
                "request target must start with '/': {:?}",
                self.target
            )));
        }
        if has_line_break(&self.target) || self.target.contains(' ') {
            return Err(WireError::InvalidInput(format!(
                "request target contains whitespace or line breaks: {:?}",
                self.target
            )));
        }
        for (name, value) in &self.headers {
            if name.is_empty() || has_line_break(name) || name.contains(':') {
                return Err(WireError::InvalidInput(format!(
                    "invalid header name {name:?}"
                )));
            }
            if has_line_break(value) {
                return Err(WireError::InvalidInput(format!(
                    "header {name} contains a line break"
                )));
            }
        }
        Ok(())
    }
}

fn has_line_break(s: &str) -> bool {
    s.contains(['\r', '\n'])
}
