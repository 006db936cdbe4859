//! CLI errors with categories, suggestions and sysexits-style exit codes.

use std::io;

use serde_json::json;
use serde_json::Value;
use thiserror::Error;

use dockwire_http::ErrorCategory;
use dockwire_http::WireError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("Terminal error: {0}")]
    Terminal(io::Error),

    #[error("{0}")]
    Usage(String),

    /// The remote process finished with a non-zero status. Nothing is
    /// printed; the status becomes the exit code.
    #[error("process exited with status {0}")]
    ExitStatus(i32),
}

impl CliError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CliError::Wire(e) => e.category(),
            CliError::Terminal(_) => ErrorCategory::External,
            CliError::Usage(_) => ErrorCategory::InvalidInput,
            CliError::ExitStatus(_) => ErrorCategory::External,
        }
    }

    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Wire(e) => e.suggestion(),
            CliError::Terminal(_) => Some("Run without -t or from an interactive terminal"),
            CliError::Usage(_) => Some("Run 'dockwire --help' for usage"),
            CliError::ExitStatus(_) => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            CliError::Wire(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Converts to UNIX sysexits.h-compliant exit code.
    pub fn exit_code(&self) -> i32 {
        if let CliError::ExitStatus(status) = self {
            return *status;
        }
        match self.category() {
            ErrorCategory::InvalidInput => 64, // EX_USAGE
            ErrorCategory::NotFound => 69,     // EX_UNAVAILABLE
            ErrorCategory::Conflict => 73,     // EX_CANTCREAT
            ErrorCategory::External => 74,     // EX_IOERR
            ErrorCategory::Protocol => 76,     // EX_PROTOCOL
            ErrorCategory::Internal => 1,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            CliError::Wire(e) => e.to_json(),
            other => {
                let mut obj = json!({
                    "message": other.to_string(),
                    "category": other.category().as_str(),
                    "retryable": other.is_retryable(),
                });
                if let Some(suggestion) = other.suggestion() {
                    obj["suggestion"] = json!(suggestion);
                }
                obj
            }
        }
    }
}
