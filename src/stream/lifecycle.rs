//! Per-connection lifecycle state machine.

use serde::Serialize;

/// Lifecycle state of a job stream.
///
/// ```text
/// open ──► terminal_sent ──► end_sent
///   └───────────┴───────────────┴──► closed
/// ```
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// Accepting events.
    Open,
    /// A `completion` or `error` event was written.
    TerminalSent,
    /// The `stream_end` event was written; close is pending.
    EndSent,
    /// Torn down; no further writes.
    Closed,
}

impl StreamState {
    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::TerminalSent)
                | (Self::TerminalSent, Self::EndSent)
                | (Self::Open | Self::TerminalSent | Self::EndSent, Self::Closed)
        )
    }

    /// Whether a terminal event has already gone out.
    #[must_use]
    pub fn terminal_sent(self) -> bool {
        !matches!(self, Self::Open)
    }

    /// Whether `stream_end` has already gone out.
    #[must_use]
    pub fn stream_end_sent(self) -> bool {
        matches!(self, Self::EndSent)
    }
}
