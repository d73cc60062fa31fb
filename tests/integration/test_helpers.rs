//! Shared test helpers for registry and emitter integration tests.
//!
//! Provides a recording [`EventSink`] that captures every frame, counts
//! `end` calls and can be told to fail writes, plus registry construction
//! with short test timings.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agent_stream::config::StreamConfig;
use agent_stream::models::event::KEEP_ALIVE_FRAME;
use agent_stream::stream::{ConnectionRegistry, EventEmitter, EventSink};
use agent_stream::{AppError, Result};
use bytes::Bytes;

/// In-memory sink that records frames as text.
#[derive(Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<String>>,
    ends: AtomicUsize,
    ended: AtomicBool,
    fail_writes: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following write fail as if the client vanished.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Raw frames in write order.
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    /// Decoded `data:` payloads, keep-alives excluded.
    pub fn events(&self) -> Vec<serde_json::Value> {
        self.frames()
            .iter()
            .filter_map(|frame| frame.strip_prefix("data: "))
            .map(|json| serde_json::from_str(json.trim_end()).expect("event json"))
            .collect()
    }

    /// The `type` field of every event, in order.
    pub fn event_types(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|event| event["type"].as_str().expect("type").to_owned())
            .collect()
    }

    pub fn keep_alive_count(&self) -> usize {
        self.frames()
            .iter()
            .filter(|frame| frame.as_str() == KEEP_ALIVE_FRAME)
            .count()
    }

    pub fn end_count(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }
}

impl EventSink for RecordingSink {
    fn write(&self, frame: Bytes) -> Result<()> {
        if self.ended.load(Ordering::SeqCst) {
            return Err(AppError::Transport("stream already ended".into()));
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Transport("client disconnected".into()));
        }
        let text = String::from_utf8(frame.to_vec()).expect("utf8 frame");
        self.frames.lock().unwrap().push(text);
        Ok(())
    }

    fn end(&self) {
        self.ends.fetch_add(1, Ordering::SeqCst);
        self.ended.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

/// Stream settings with short timings; keep-alive and idle sweeps are
/// pushed far out so they stay quiet unless a test asks for them.
pub fn test_stream_config() -> StreamConfig {
    StreamConfig {
        max_concurrent_streams: 3,
        keep_alive_interval_ms: 600_000,
        idle_timeout_ms: 600_000,
        idle_sweep_interval_ms: 600_000,
        stage1_delay_ms: 50,
        stage2_delay_ms: 100,
    }
}

pub fn test_registry() -> Arc<ConnectionRegistry> {
    ConnectionRegistry::new(test_stream_config())
}

/// Open `job_id` on a fresh recording sink and return an emitter for it.
pub fn open_job(
    registry: &Arc<ConnectionRegistry>,
    job_id: &str,
) -> (Arc<RecordingSink>, EventEmitter) {
    let sink = RecordingSink::new();
    registry
        .open(job_id, Arc::clone(&sink) as Arc<dyn EventSink>)
        .expect("open stream");
    (sink, EventEmitter::new(job_id, Arc::clone(registry)))
}
