//! Connection registry: one push stream per job.
//!
//! The registry exclusively owns every [`ConnectionRecord`] and is the only
//! writer of each record's [`EventSink`]. All methods are synchronous and
//! run to completion under a single lock, which is never held across an
//! await point; this gives per-job write ordering without a writer task.
//!
//! Background timers (keep-alive, shutdown choreography) address a record by
//! `(job_id, connection_id)`. A timer that outlives its record, or whose job
//! was reopened on a fresh connection, finds no match and does nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::keep_alive;
use super::lifecycle::StreamState;
use super::transport::EventSink;
use crate::config::StreamConfig;
use crate::models::event::{StreamEvent, KEEP_ALIVE_FRAME};
use crate::{AppError, Result};

/// Counts of tracked streams.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StreamStats {
    /// Records currently tracked.
    pub total: usize,
    /// Records that can still be written to.
    pub active: usize,
    /// Records whose client went away and that await reclamation.
    pub inactive: usize,
}

/// Read-only snapshot of a connection record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Job the stream belongs to.
    pub job_id: String,
    /// Identifier of this particular connection; changes on reopen.
    pub connection_id: Uuid,
    /// Lifecycle state.
    pub state: StreamState,
    /// Whether the stream can still be written to.
    pub is_active: bool,
    /// Time since the last successful write of any kind.
    pub since_last_activity: Duration,
    /// Time since the last successful event write (keep-alives excluded).
    pub since_last_event: Duration,
}

/// Handle for the shutdown choreography of one connection.
///
/// Returned by [`ConnectionRegistry::begin_shutdown`]. `cancel` fires when
/// the connection is closed by any path.
#[derive(Debug, Clone)]
pub struct ShutdownTicket {
    /// Connection the terminal event was written to.
    pub connection_id: Uuid,
    /// Pending-closure cancellation token.
    pub cancel: CancellationToken,
}

/// State of one job stream. Owned by the registry.
struct ConnectionRecord {
    connection_id: Uuid,
    sink: Arc<dyn EventSink>,
    state: StreamState,
    is_active: bool,
    last_activity_at: Instant,
    last_event_at: Instant,
    /// Cancels the keep-alive task and every timer derived from it.
    cancel: CancellationToken,
    pending_closure: Option<CancellationToken>,
}

impl ConnectionRecord {
    fn live(&self) -> bool {
        self.is_active && !self.sink.is_closed()
    }

    fn transition(&mut self, next: StreamState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }

    fn snapshot(&self, job_id: &str, now: Instant) -> ConnectionInfo {
        ConnectionInfo {
            job_id: job_id.to_owned(),
            connection_id: self.connection_id,
            state: self.state,
            is_active: self.live(),
            since_last_activity: now.saturating_duration_since(self.last_activity_at),
            since_last_event: now.saturating_duration_since(self.last_event_at),
        }
    }

    /// Release everything the record holds. Safe to call more than once.
    fn teardown(&mut self) {
        self.is_active = false;
        self.transition(StreamState::Closed);
        self.cancel.cancel();
        if let Some(closure) = self.pending_closure.take() {
            closure.cancel();
        }
        if !self.sink.is_closed() {
            self.sink.end();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Event,
    KeepAlive,
}

/// Registry of job streams with capacity, keep-alive and idle management.
pub struct ConnectionRegistry {
    config: StreamConfig,
    connections: Mutex<HashMap<String, ConnectionRecord>>,
    weak_self: Weak<Self>,
}

impl ConnectionRegistry {
    /// Create a registry. Shared by reference between the HTTP layer and
    /// every emitter.
    #[must_use]
    pub fn new(config: StreamConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            config,
            connections: Mutex::new(HashMap::new()),
            weak_self: weak_self.clone(),
        })
    }

    /// Settings the registry was built with.
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ConnectionRecord>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a stream for `job_id`, replacing any existing one.
    ///
    /// Records whose client has already disconnected are reclaimed first so
    /// they do not count against the ceiling.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Capacity` when `max_concurrent_streams` other jobs
    /// already hold active streams. An existing stream for `job_id` is left
    /// untouched in that case.
    pub fn open(&self, job_id: &str, sink: Arc<dyn EventSink>) -> Result<ConnectionInfo> {
        let mut connections = self.lock();

        let disconnected: Vec<String> = connections
            .iter()
            .filter(|(_, record)| !record.live())
            .map(|(id, _)| id.clone())
            .collect();
        for id in disconnected {
            if let Some(mut record) = connections.remove(&id) {
                debug!(job_id = %id, connection_id = %record.connection_id, "reclaiming disconnected stream");
                record.teardown();
            }
        }

        let active_elsewhere = connections
            .iter()
            .filter(|(id, record)| id.as_str() != job_id && record.is_active)
            .count();
        if active_elsewhere >= self.config.max_concurrent_streams {
            warn!(
                job_id,
                max = self.config.max_concurrent_streams,
                "stream capacity reached"
            );
            return Err(AppError::Capacity(format!(
                "maximum of {} concurrent streams reached",
                self.config.max_concurrent_streams
            )));
        }

        if let Some(mut previous) = connections.remove(job_id) {
            info!(job_id, connection_id = %previous.connection_id, "replacing existing stream");
            previous.teardown();
        }

        let now = Instant::now();
        let record = ConnectionRecord {
            connection_id: Uuid::new_v4(),
            sink,
            state: StreamState::Open,
            is_active: true,
            last_activity_at: now,
            last_event_at: now,
            cancel: CancellationToken::new(),
            pending_closure: None,
        };
        let info = record.snapshot(job_id, now);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                keep_alive::spawn(
                    &handle,
                    self.weak_self.clone(),
                    job_id.to_owned(),
                    record.connection_id,
                    self.config.keep_alive_interval(),
                    record.cancel.clone(),
                );
            }
            Err(_) => warn!(job_id, "no async runtime; keep-alive disabled for stream"),
        }

        info!(job_id, connection_id = %record.connection_id, "stream opened");
        connections.insert(job_id.to_owned(), record);
        Ok(info)
    }

    /// Write an event to the job's stream.
    ///
    /// Returns `false` without side effects when there is no active stream.
    /// A failed write force-closes the stream and also returns `false`.
    pub fn send(&self, job_id: &str, event: &StreamEvent) -> bool {
        let Some(frame) = encode(job_id, event) else {
            return false;
        };
        let mut connections = self.lock();
        write_locked(&mut connections, job_id, None, frame, WriteKind::Event)
    }

    /// Write a keep-alive comment to the job's stream.
    ///
    /// Same failure handling as [`send`](Self::send). Keep-alives refresh
    /// the activity clock but not the idle clock.
    pub fn send_keep_alive(&self, job_id: &str) -> bool {
        let mut connections = self.lock();
        write_locked(
            &mut connections,
            job_id,
            None,
            Bytes::from_static(KEEP_ALIVE_FRAME.as_bytes()),
            WriteKind::KeepAlive,
        )
    }

    /// Keep-alive bound to one connection; used by the keep-alive task.
    pub(crate) fn keep_alive_connection(&self, job_id: &str, connection_id: Uuid) -> bool {
        let mut connections = self.lock();
        write_locked(
            &mut connections,
            job_id,
            Some(connection_id),
            Bytes::from_static(KEEP_ALIVE_FRAME.as_bytes()),
            WriteKind::KeepAlive,
        )
    }

    /// Write a terminal event and arm the closure timer.
    ///
    /// Only the first terminal event per connection gets through: returns
    /// `None` when the event is not terminal, the stream is missing,
    /// inactive, already past `open`, or the write failed.
    pub fn begin_shutdown(&self, job_id: &str, terminal: &StreamEvent) -> Option<ShutdownTicket> {
        if !terminal.event_type.is_terminal() {
            warn!(job_id, event_type = ?terminal.event_type, "not a terminal event");
            return None;
        }
        let frame = encode(job_id, terminal)?;
        let mut connections = self.lock();

        let record = connections.get(job_id)?;
        if !record.is_active || record.state.terminal_sent() {
            debug!(job_id, state = ?record.state, "terminal event suppressed");
            return None;
        }
        let connection_id = record.connection_id;

        if !write_locked(
            &mut connections,
            job_id,
            Some(connection_id),
            frame,
            WriteKind::Event,
        ) {
            return None;
        }

        let record = connections.get_mut(job_id)?;
        record.transition(StreamState::TerminalSent);
        let cancel = record.cancel.child_token();
        record.pending_closure = Some(cancel.clone());
        debug!(job_id, %connection_id, "terminal event sent; closure armed");
        Some(ShutdownTicket {
            connection_id,
            cancel,
        })
    }

    /// Write `stream_end` if the connection is still active and has sent
    /// its terminal event but not yet `stream_end`.
    pub fn send_stream_end(&self, job_id: &str, connection_id: Uuid, event: &StreamEvent) -> bool {
        let Some(frame) = encode(job_id, event) else {
            return false;
        };
        let mut connections = self.lock();

        let eligible = connections.get(job_id).is_some_and(|record| {
            record.connection_id == connection_id
                && record.is_active
                && record.state.terminal_sent()
                && !record.state.stream_end_sent()
        });
        if !eligible {
            return false;
        }
        if !write_locked(
            &mut connections,
            job_id,
            Some(connection_id),
            frame,
            WriteKind::Event,
        ) {
            return false;
        }
        if let Some(record) = connections.get_mut(job_id) {
            record.transition(StreamState::EndSent);
        }
        true
    }

    /// Close the job's stream only if it is still `connection_id`.
    pub fn close_connection(&self, job_id: &str, connection_id: Uuid) -> bool {
        let mut connections = self.lock();
        if connections
            .get(job_id)
            .is_none_or(|record| record.connection_id != connection_id)
        {
            return false;
        }
        close_locked(&mut connections, job_id)
    }

    /// Close the job's stream. Idempotent: returns `false` when nothing was
    /// open.
    pub fn close(&self, job_id: &str) -> bool {
        let mut connections = self.lock();
        close_locked(&mut connections, job_id)
    }

    /// Close every stream. Returns the number closed.
    pub fn close_all(&self) -> usize {
        let mut connections = self.lock();
        let count = connections.len();
        for (job_id, mut record) in connections.drain() {
            debug!(job_id, connection_id = %record.connection_id, "closing stream");
            record.teardown();
        }
        if count > 0 {
            info!(count, "all streams closed");
        }
        count
    }

    /// Counts of tracked, active and inactive streams.
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        let connections = self.lock();
        let total = connections.len();
        let active = connections.values().filter(|r| r.live()).count();
        StreamStats {
            total,
            active,
            inactive: total - active,
        }
    }

    /// Whether the job has a writable stream.
    #[must_use]
    pub fn is_active(&self, job_id: &str) -> bool {
        self.lock().get(job_id).is_some_and(ConnectionRecord::live)
    }

    /// Lifecycle state of the job's stream, if tracked.
    #[must_use]
    pub fn state(&self, job_id: &str) -> Option<StreamState> {
        self.lock().get(job_id).map(|r| r.state)
    }

    /// Snapshot of the job's stream, if tracked.
    #[must_use]
    pub fn connection(&self, job_id: &str) -> Option<ConnectionInfo> {
        let now = Instant::now();
        self.lock().get(job_id).map(|r| r.snapshot(job_id, now))
    }

    /// Close streams with no event for `idle_timeout`, and streams whose
    /// client has disconnected. Returns the reclaimed job ids.
    ///
    /// Idle detection uses the event clock, so keep-alives alone do not keep
    /// a silent job alive.
    pub fn sweep_idle(&self) -> Vec<String> {
        let idle_timeout = self.config.idle_timeout();
        let now = Instant::now();
        let mut connections = self.lock();

        let expired: Vec<String> = connections
            .iter()
            .filter(|(_, record)| {
                !record.live() || now.saturating_duration_since(record.last_event_at) >= idle_timeout
            })
            .map(|(id, _)| id.clone())
            .collect();

        for job_id in &expired {
            if let Some(mut record) = connections.remove(job_id) {
                info!(
                    job_id,
                    connection_id = %record.connection_id,
                    idle_ms = now.saturating_duration_since(record.last_event_at).as_millis(),
                    "reclaiming idle stream"
                );
                record.teardown();
            }
        }
        expired
    }
}

fn encode(job_id: &str, event: &StreamEvent) -> Option<Bytes> {
    match event.to_frame() {
        Ok(frame) => Some(frame),
        Err(err) => {
            warn!(job_id, %err, "failed to encode stream event");
            None
        }
    }
}

fn write_locked(
    connections: &mut HashMap<String, ConnectionRecord>,
    job_id: &str,
    expected: Option<Uuid>,
    frame: Bytes,
    kind: WriteKind,
) -> bool {
    let Some(record) = connections.get_mut(job_id) else {
        return false;
    };
    if !record.is_active || expected.is_some_and(|id| id != record.connection_id) {
        return false;
    }

    match record.sink.write(frame) {
        Ok(()) => {
            let now = Instant::now();
            record.last_activity_at = now;
            if kind == WriteKind::Event {
                record.last_event_at = now;
            }
            true
        }
        Err(err) => {
            warn!(job_id, connection_id = %record.connection_id, %err, ?kind, "stream write failed; closing");
            close_locked(connections, job_id);
            false
        }
    }
}

fn close_locked(connections: &mut HashMap<String, ConnectionRecord>, job_id: &str) -> bool {
    let Some(mut record) = connections.remove(job_id) else {
        return false;
    };
    record.teardown();
    info!(job_id, connection_id = %record.connection_id, "stream closed");
    true
}
