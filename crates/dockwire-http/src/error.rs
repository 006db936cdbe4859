use std::io;

use serde_json::Value;
use thiserror::Error;

/// Error category for programmatic handling by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Engine reported that the resource does not exist
    NotFound,
    /// Engine reported a state conflict (name in use, container running)
    Conflict,
    /// The caller built an invalid endpoint or request
    InvalidInput,
    /// Transport or engine-side failure
    External,
    /// The byte stream no longer follows HTTP or the stream framing
    Protocol,
    /// Local encoding/decoding failure
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::InvalidInput => "invalid_input",
            ErrorCategory::External => "external",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Internal => "internal",
        }
    }
}

/// Framing failure raised from inside an `io::Read` implementation.
///
/// Readers can only return `io::Error`, so the codec wraps this value as the
/// error payload and `WireError::from` recovers it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("{0}")]
    Broken(String),

    #[error("{0}")]
    Violation(String),
}

impl FrameError {
    pub(crate) fn broken(message: impl Into<String>) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            FrameError::Broken(message.into()),
        )
    }

    pub(crate) fn truncated(message: impl Into<String>) -> io::Error {
        io::Error::new(
            io::ErrorKind::UnexpectedEof,
            FrameError::Broken(message.into()),
        )
    }

    pub(crate) fn violation(message: impl Into<String>) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            FrameError::Violation(message.into()),
        )
    }
}

#[derive(Error, Debug)]
pub enum WireError {
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connection {
        endpoint: String,
        reason: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("Broken frame: {0}")]
    BrokenFrame(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Request failed ({status}): {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(io::Error),

    #[error("Failed to encode or decode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<io::Error> for WireError {
    fn from(err: io::Error) -> Self {
        let frame = err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<FrameError>())
            .cloned();
        match frame {
            Some(FrameError::Broken(message)) => WireError::BrokenFrame(message),
            Some(FrameError::Violation(message)) => WireError::ProtocolViolation(message),
            None if err.kind() == io::ErrorKind::UnexpectedEof => {
                WireError::BrokenFrame(err.to_string())
            }
            None => WireError::Io(err),
        }
    }
}

impl From<WireError> for io::Error {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Io(e) => e,
            WireError::BrokenFrame(message) => FrameError::broken(message),
            WireError::ProtocolViolation(message) => FrameError::violation(message),
            other => io::Error::other(other),
        }
    }
}

impl WireError {
    pub(crate) fn connection(endpoint: impl ToString, source: io::Error) -> Self {
        WireError::Connection {
            endpoint: endpoint.to_string(),
            reason: source.to_string(),
            source: Some(source),
        }
    }

    pub(crate) fn connection_reason(endpoint: impl ToString, reason: impl Into<String>) -> Self {
        WireError::Connection {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
            source: None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            WireError::NotFound(_) => ErrorCategory::NotFound,
            WireError::Conflict(_) => ErrorCategory::Conflict,
            WireError::InvalidInput(_) => ErrorCategory::InvalidInput,
            WireError::Connection { .. } | WireError::RequestFailed { .. } | WireError::Io(_) => {
                ErrorCategory::External
            }
            WireError::BrokenFrame(_) | WireError::ProtocolViolation(_) => ErrorCategory::Protocol,
            WireError::Json(_) => ErrorCategory::Internal,
        }
    }

    /// HTTP status carried by engine-reported failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            WireError::NotFound(_) => Some(404),
            WireError::Conflict(_) => Some(409),
            WireError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether a fresh connection may succeed where this one failed.
    ///
    /// Nothing in this crate retries; the hint is for the caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            WireError::Connection { .. } | WireError::Io(_) | WireError::BrokenFrame(_) => true,
            WireError::RequestFailed { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            WireError::Connection { .. } => {
                Some("Check that the engine is running and DOCKER_HOST points at it")
            }
            WireError::BrokenFrame(_) | WireError::ProtocolViolation(_) => {
                Some("The connection was discarded; reconnect and retry the call")
            }
            WireError::NotFound(_) => Some("Check the container or image name"),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut obj = serde_json::json!({
            "message": self.to_string(),
            "category": self.category().as_str(),
            "retryable": self.is_retryable(),
        });
        if let Some(status) = self.status() {
            obj["status"] = serde_json::json!(status);
        }
        if let Some(suggestion) = self.suggestion() {
            obj["suggestion"] = serde_json::json!(suggestion);
        }
        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_round_trips_through_io_error() {
        let io_err = FrameError::broken("bad chunk size");
        let err = WireError::from(io_err);
        assert!(matches!(err, WireError::BrokenFrame(ref m) if m == "bad chunk size"));

        let io_err = FrameError::violation("unknown stream id 7");
        let err = WireError::from(io_err);
        assert!(matches!(err, WireError::ProtocolViolation(_)));
    }

    #[test]
    fn test_unexpected_eof_is_broken_frame() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "early eof");
        assert!(matches!(WireError::from(io_err), WireError::BrokenFrame(_)));
    }

    #[test]
    fn test_plain_io_error_stays_io() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(WireError::from(io_err), WireError::Io(_)));
    }

    #[test]
    fn test_wire_error_back_to_io_keeps_frame_payload() {
        let io_err: io::Error = WireError::BrokenFrame("truncated".to_string()).into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);
        assert!(matches!(WireError::from(io_err), WireError::BrokenFrame(_)));
    }

    #[test]
    fn test_categories_and_status() {
        assert_eq!(
            WireError::NotFound("x".into()).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(WireError::Conflict("x".into()).status(), Some(409));
        let failed = WireError::RequestFailed {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(failed.status(), Some(500));
        assert!(failed.is_retryable());
        assert!(!WireError::Conflict("x".into()).is_retryable());
    }

    #[test]
    fn test_request_failed_display() {
        let err = WireError::RequestFailed {
            status: 500,
            message: "server error".to_string(),
        };
        assert_eq!(err.to_string(), "Request failed (500): server error");
    }

    #[test]
    fn test_to_json_includes_status_and_category() {
        let json = WireError::NotFound("no such container".into()).to_json();
        assert_eq!(json["status"], 404);
        assert_eq!(json["category"], "not_found");
        assert_eq!(json["retryable"], false);
    }
}
