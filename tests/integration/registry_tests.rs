//! Integration tests for the connection registry: capacity, replacement,
//! write ordering and write-failure handling.

use std::sync::Arc;

use agent_stream::config::StreamConfig;
use agent_stream::models::event::{EventType, StreamEvent};
use agent_stream::stream::{ConnectionRegistry, EventSink, StreamState, StreamStats};
use agent_stream::AppError;

use super::test_helpers::{open_job, test_registry, test_stream_config, RecordingSink};

#[tokio::test]
async fn open_then_send_delivers_event() {
    let registry = test_registry();
    let (sink, emitter) = open_job(&registry, "job-1");

    assert!(emitter.information("hello"));

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "information");
    assert_eq!(events[0]["jobId"], "job-1");
    assert_eq!(events[0]["message"], "hello");
    assert_eq!(registry.state("job-1"), Some(StreamState::Open));
}

#[tokio::test]
async fn send_to_unknown_job_is_a_no_op() {
    let registry = test_registry();
    let event = StreamEvent::new(EventType::Information, "ghost");

    assert!(!registry.send("ghost", &event));
    assert!(!registry.send_keep_alive("ghost"));
    assert!(!registry.close("ghost"));
    assert_eq!(registry.stats().total, 0);
}

#[tokio::test]
async fn events_arrive_in_emission_order() {
    let registry = test_registry();
    let (sink, emitter) = open_job(&registry, "job-1");

    emitter.start("go");
    emitter.progress("step 1", Some(10));
    emitter.warning("careful");
    emitter.progress("step 2", Some(60));
    emitter.information("nearly");

    assert_eq!(
        sink.event_types(),
        vec!["start", "progress", "warning", "progress", "information"]
    );
}

#[tokio::test]
async fn capacity_rejects_extra_job_and_keeps_existing_streams() {
    let registry = ConnectionRegistry::new(StreamConfig {
        max_concurrent_streams: 2,
        ..test_stream_config()
    });
    let (a, _) = open_job(&registry, "a");
    let (b, _) = open_job(&registry, "b");

    let extra = RecordingSink::new();
    let result = registry.open("c", Arc::clone(&extra) as Arc<dyn EventSink>);

    assert!(matches!(result, Err(AppError::Capacity(_))));
    assert!(registry.is_active("a"));
    assert!(registry.is_active("b"));
    assert!(registry.state("c").is_none());
    assert_eq!(a.end_count(), 0);
    assert_eq!(b.end_count(), 0);
    assert_eq!(
        registry.stats(),
        StreamStats {
            total: 2,
            active: 2,
            inactive: 0
        }
    );
}

#[tokio::test]
async fn reopening_a_job_at_capacity_replaces_it() {
    let registry = ConnectionRegistry::new(StreamConfig {
        max_concurrent_streams: 1,
        ..test_stream_config()
    });
    let (first, emitter) = open_job(&registry, "job-1");
    let before = registry.connection("job-1").expect("tracked");

    let (second, _) = open_job(&registry, "job-1");
    let after = registry.connection("job-1").expect("tracked");

    assert_ne!(before.connection_id, after.connection_id);
    assert_eq!(first.end_count(), 1, "previous connection is ended");

    assert!(emitter.information("to the new client"));
    assert!(first.events().is_empty());
    assert_eq!(second.event_types(), vec!["information"]);
}

#[tokio::test]
async fn closing_frees_a_slot() {
    let registry = ConnectionRegistry::new(StreamConfig {
        max_concurrent_streams: 1,
        ..test_stream_config()
    });
    let (_, emitter) = open_job(&registry, "a");
    assert!(emitter.close());

    let (_, _) = open_job(&registry, "b");
    assert!(registry.is_active("b"));
}

#[tokio::test]
async fn write_failure_closes_only_that_stream() {
    let registry = test_registry();
    let (a, emitter_a) = open_job(&registry, "a");
    let (b, emitter_b) = open_job(&registry, "b");

    a.fail_writes();
    assert!(!emitter_a.information("lost"));

    assert!(registry.state("a").is_none());
    assert_eq!(a.end_count(), 1);

    assert!(emitter_b.information("still here"));
    assert_eq!(b.event_types(), vec!["information"]);
    assert_eq!(registry.stats().total, 1);
}

#[tokio::test]
async fn no_write_after_close() {
    let registry = test_registry();
    let (sink, emitter) = open_job(&registry, "job-1");

    emitter.information("before");
    assert!(emitter.close());
    assert!(!emitter.close(), "close is idempotent");

    assert!(!emitter.information("after"));
    assert!(!emitter.completion("done", None));
    assert!(!registry.send_keep_alive("job-1"));

    assert_eq!(sink.event_types(), vec!["information"]);
    assert_eq!(sink.end_count(), 1);
}

#[tokio::test]
async fn client_disconnect_shows_as_inactive_until_reclaimed() {
    let registry = test_registry();
    let (sink, emitter) = open_job(&registry, "job-1");

    // Client went away without the registry being told.
    sink.end();

    assert!(!registry.is_active("job-1"));
    assert_eq!(
        registry.stats(),
        StreamStats {
            total: 1,
            active: 0,
            inactive: 1
        }
    );

    let reclaimed = registry.sweep_idle();
    assert_eq!(reclaimed, vec!["job-1".to_owned()]);
    assert_eq!(registry.stats().total, 0);
    assert_eq!(sink.end_count(), 1, "teardown does not end an ended sink");
    assert!(!emitter.information("nobody listening"));
}

#[tokio::test]
async fn close_all_ends_every_stream() {
    let registry = test_registry();
    let (a, _) = open_job(&registry, "a");
    let (b, _) = open_job(&registry, "b");

    assert_eq!(registry.close_all(), 2);
    assert_eq!(a.end_count(), 1);
    assert_eq!(b.end_count(), 1);
    assert_eq!(registry.stats().total, 0);
    assert_eq!(registry.close_all(), 0);
}
