//! Maps failed responses onto the error taxonomy.

use serde::Deserialize;

use crate::error::WireError;
use crate::response::ResponseHead;

/// Error payload the engine sends with failed requests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
}

/// Returns the typed failure for a response whose status is 300 or above,
/// or `None` for a success.
///
/// `body` is the full failure body. It is only consulted when the response
/// declares a JSON content type; otherwise the numeric status is the message.
pub fn classify(head: &ResponseHead, body: &[u8]) -> Option<WireError> {
    if !head.is_failure() {
        return None;
    }

    let message = failure_message(head, body);
    Some(match head.status {
        404 => WireError::NotFound(message),
        409 => WireError::Conflict(message),
        status => WireError::RequestFailed { status, message },
    })
}

fn failure_message(head: &ResponseHead, body: &[u8]) -> String {
    let is_json = head
        .content_type()
        .is_some_and(|value| value.trim_start().starts_with("application/json"));
    if is_json {
        if let Ok(detail) = serde_json::from_slice::<ErrorDetail>(body) {
            if !detail.message.is_empty() {
                return detail.message;
            }
        }
    }
    head.status.to_string()
}
