//! Wire events pushed to stream clients.
//!
//! Every event travels as a single server-sent-events frame
//! (`data: <json>\n\n`). Keep-alive pings use the SSE comment syntax and
//! never reach the client's payload handler.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::span::ContentCategory;
use crate::Result;

/// Comment frame written periodically to keep intermediaries from timing out.
pub const KEEP_ALIVE_FRAME: &str = ": keep-alive\n\n";

/// Event discriminator carried in the payload's `type` field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Stream opened.
    Start,
    /// Informational notice.
    Information,
    /// Non-fatal warning.
    Warning,
    /// Progress update.
    Progress,
    /// A tool is being invoked.
    ToolUse,
    /// Job finished successfully (terminal).
    Completion,
    /// Job failed (terminal).
    Error,
    /// Log line or classified content.
    Log,
    /// Agent needs an answer from the user.
    Question,
    /// Last frame before the connection closes.
    StreamEnd,
}

impl EventType {
    /// Whether this event starts the shutdown choreography.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completion | Self::Error)
    }
}

/// Severity attached to `log` events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal operation.
    Info,
    /// Something unexpected but recoverable.
    Warn,
    /// Failure.
    Error,
}

/// Structured payload of one wire event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    /// Event discriminator.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Job the event belongs to.
    pub job_id: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Arbitrary structured data (tool input, completion result...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Tool name for `tool_use` and classified tool content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Classifier category for content-bearing `log` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentCategory>,
    /// Percentage complete, 0 to 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Log severity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
}

impl StreamEvent {
    /// Create a bare event stamped with the current time.
    #[must_use]
    pub fn new(event_type: EventType, job_id: impl Into<String>) -> Self {
        Self {
            event_type,
            job_id: job_id.into(),
            timestamp: Utc::now(),
            message: None,
            data: None,
            tool_name: None,
            content_type: None,
            progress: None,
            level: None,
        }
    }

    /// Attach a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach structured data.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach a tool name.
    #[must_use]
    pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    /// Attach a content category.
    #[must_use]
    pub fn with_content_type(mut self, content_type: ContentCategory) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// Attach a progress percentage, clamped to 100.
    #[must_use]
    pub fn with_progress(mut self, percent: u8) -> Self {
        self.progress = Some(percent.min(100));
        self
    }

    /// Attach a log level.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Encode the event as one SSE `data:` frame.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Serialization` if the payload cannot be encoded.
    pub fn to_frame(&self) -> Result<Bytes> {
        let json = serde_json::to_string(self)?;
        Ok(Bytes::from(format!("data: {json}\n\n")))
    }
}
