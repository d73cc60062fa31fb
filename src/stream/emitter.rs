//! Per-job event emitter.
//!
//! Translates semantic calls from the orchestration layer into wire events
//! and routes them through the [`ConnectionRegistry`]. The emitter holds no
//! lifecycle state of its own, so any number of emitters bound to the same
//! job observe one consistent lifecycle.
//!
//! Terminal events (`completion`, `error`) trigger a two-phase shutdown:
//!
//! 1. the terminal event is written immediately;
//! 2. `stage1_delay` later, `stream_end` is written if the connection is
//!    still active and has not already sent it;
//! 3. `stage2_delay` after the terminal event, the connection is closed.
//!
//! The gap lets the client's transport deliver the terminal event before the
//! socket goes away.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, info_span, Instrument};

use super::registry::{ConnectionRegistry, ShutdownTicket};
use crate::models::event::{EventType, LogLevel, StreamEvent};
use crate::models::span::ClassifiedSpan;

/// Emitter bound to one job.
#[derive(Clone)]
pub struct EventEmitter {
    job_id: String,
    registry: Arc<ConnectionRegistry>,
}

impl EventEmitter {
    /// Bind an emitter to `job_id`.
    #[must_use]
    pub fn new(job_id: impl Into<String>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            job_id: job_id.into(),
            registry,
        }
    }

    /// Job this emitter publishes to.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    fn event(&self, event_type: EventType) -> StreamEvent {
        StreamEvent::new(event_type, self.job_id.clone())
    }

    fn send(&self, event: &StreamEvent) -> bool {
        self.registry.send(&self.job_id, event)
    }

    /// Announce that the stream is open.
    pub fn start(&self, message: &str) -> bool {
        self.send(&self.event(EventType::Start).with_message(message))
    }

    /// Publish an informational notice.
    pub fn information(&self, message: &str) -> bool {
        self.send(&self.event(EventType::Information).with_message(message))
    }

    /// Publish a warning.
    pub fn warning(&self, message: &str) -> bool {
        self.send(&self.event(EventType::Warning).with_message(message))
    }

    /// Publish a progress update; `percent` is clamped to 100.
    pub fn progress(&self, message: &str, percent: Option<u8>) -> bool {
        let mut event = self.event(EventType::Progress).with_message(message);
        if let Some(percent) = percent {
            event = event.with_progress(percent);
        }
        self.send(&event)
    }

    /// Announce a tool invocation with its input.
    pub fn tool_use(&self, tool_name: &str, input: serde_json::Value) -> bool {
        self.send(
            &self
                .event(EventType::ToolUse)
                .with_tool_name(tool_name)
                .with_data(input),
        )
    }

    /// Publish a log line.
    pub fn log(&self, level: LogLevel, message: &str) -> bool {
        self.send(
            &self
                .event(EventType::Log)
                .with_level(level)
                .with_message(message),
        )
    }

    /// Publish a classified span as a `log` event tagged with its category.
    pub fn content(&self, span: &ClassifiedSpan) -> bool {
        let mut event = self
            .event(EventType::Log)
            .with_level(LogLevel::Info)
            .with_message(span.text.clone())
            .with_content_type(span.category);
        if let Some(tool_name) = &span.tool_name {
            event = event.with_tool_name(tool_name.clone());
        }
        self.send(&event)
    }

    /// Ask the user a question, optionally offering choices.
    pub fn question(&self, message: &str, options: &[String]) -> bool {
        let mut event = self.event(EventType::Question).with_message(message);
        if !options.is_empty() {
            event = event.with_data(serde_json::json!({ "options": options }));
        }
        self.send(&event)
    }

    /// Report successful completion and start the shutdown sequence.
    ///
    /// Returns `false` if a terminal event was already sent for this
    /// connection or there is no active stream.
    pub fn completion(&self, message: &str, result: Option<serde_json::Value>) -> bool {
        let mut event = self.event(EventType::Completion).with_message(message);
        if let Some(result) = result {
            event = event.with_data(result);
        }
        self.terminate(&event)
    }

    /// Report failure and start the shutdown sequence.
    ///
    /// Same exactly-once rules as [`completion`](Self::completion).
    pub fn error(&self, err: &dyn Display) -> bool {
        let event = self
            .event(EventType::Error)
            .with_level(LogLevel::Error)
            .with_message(err.to_string());
        self.terminate(&event)
    }

    /// Close the stream now, cancelling any pending shutdown timers.
    pub fn close(&self) -> bool {
        self.registry.close(&self.job_id)
    }

    fn terminate(&self, event: &StreamEvent) -> bool {
        let Some(ticket) = self.registry.begin_shutdown(&self.job_id, event) else {
            debug!(job_id = %self.job_id, event_type = ?event.event_type, "terminal event not sent");
            return false;
        };

        let config = self.registry.config();
        let stage1 = config.stage1_delay();
        let stage2 = config.stage2_delay().saturating_sub(stage1);

        if let Ok(handle) = Handle::try_current() {
            let span = info_span!("stream_shutdown", job_id = %self.job_id, connection_id = %ticket.connection_id);
            handle.spawn(
                finish(
                    Arc::clone(&self.registry),
                    self.job_id.clone(),
                    ticket,
                    stage1,
                    stage2,
                )
                .instrument(span),
            );
        } else {
            // No runtime to host the timers: run both phases immediately.
            let end = self.event(EventType::StreamEnd);
            self.registry
                .send_stream_end(&self.job_id, ticket.connection_id, &end);
            self.registry
                .close_connection(&self.job_id, ticket.connection_id);
        }
        true
    }
}

/// Phase two and three of the shutdown sequence.
///
/// Every step is guarded by the ticket's cancellation token and by the
/// registry's connection-id checks, so a manual close or a reopen in
/// between turns the remaining steps into no-ops.
async fn finish(
    registry: Arc<ConnectionRegistry>,
    job_id: String,
    ticket: ShutdownTicket,
    stage1: Duration,
    stage2: Duration,
) {
    tokio::select! {
        () = ticket.cancel.cancelled() => return,
        () = tokio::time::sleep(stage1) => {}
    }
    let end = StreamEvent::new(EventType::StreamEnd, job_id.clone());
    if !registry.send_stream_end(&job_id, ticket.connection_id, &end) {
        debug!("stream_end skipped");
    }

    tokio::select! {
        () = ticket.cancel.cancelled() => return,
        () = tokio::time::sleep(stage2) => {}
    }
    registry.close_connection(&job_id, ticket.connection_id);
}
