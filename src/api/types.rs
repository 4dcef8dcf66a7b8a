//! API request and response types

use crate::record_log::LogRecord;
use crate::transport::OutgoingMessage;
use serde::{Deserialize, Serialize};

/// Replies produced by one inbound activity
#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub replies: Vec<OutgoingMessage>,
}

/// Payload to broadcast to every registered channel
#[derive(Debug, Deserialize)]
pub struct NotificationRequest {
    pub message: String,
}

/// Optional body for a job completion event
#[derive(Debug, Default, Deserialize)]
pub struct CompleteJobRequest {
    #[serde(default)]
    pub detail: Option<String>,
}

/// Contents of the job or channel log
#[derive(Debug, Serialize, Deserialize)]
pub struct LogResponse {
    pub records: Vec<LogRecord>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
