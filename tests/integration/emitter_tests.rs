//! Integration tests for the payloads produced by `EventEmitter`.

use agent_stream::classifier::ContentClassifier;
use agent_stream::models::event::LogLevel;
use agent_stream::stream::EventEmitter;

use super::test_helpers::{open_job, test_registry};

#[tokio::test]
async fn progress_carries_clamped_percentage() {
    let registry = test_registry();
    let (sink, emitter) = open_job(&registry, "job-1");

    emitter.progress("halfway", Some(50));
    emitter.progress("overshoot", Some(250));
    emitter.progress("unknown", None);

    let events = sink.events();
    assert_eq!(events[0]["progress"], 50);
    assert_eq!(events[1]["progress"], 100);
    assert!(events[2].get("progress").is_none());
}

#[tokio::test]
async fn tool_use_carries_name_and_input() {
    let registry = test_registry();
    let (sink, emitter) = open_job(&registry, "job-1");

    emitter.tool_use("read_file", serde_json::json!({ "path": "src/lib.rs" }));

    let event = &sink.events()[0];
    assert_eq!(event["type"], "tool_use");
    assert_eq!(event["toolName"], "read_file");
    assert_eq!(event["data"]["path"], "src/lib.rs");
}

#[tokio::test]
async fn question_lists_options_when_given() {
    let registry = test_registry();
    let (sink, emitter) = open_job(&registry, "job-1");

    emitter.question("Proceed?", &["yes".to_owned(), "no".to_owned()]);
    emitter.question("Anything else?", &[]);

    let events = sink.events();
    assert_eq!(events[0]["type"], "question");
    assert_eq!(events[0]["data"]["options"], serde_json::json!(["yes", "no"]));
    assert!(events[1].get("data").is_none());
}

#[tokio::test]
async fn log_carries_level() {
    let registry = test_registry();
    let (sink, emitter) = open_job(&registry, "job-1");

    emitter.log(LogLevel::Warn, "disk nearly full");

    let event = &sink.events()[0];
    assert_eq!(event["type"], "log");
    assert_eq!(event["level"], "warn");
    assert_eq!(event["message"], "disk nearly full");
}

#[tokio::test]
async fn classified_spans_become_tagged_log_events() {
    let registry = test_registry();
    let (sink, emitter) = open_job(&registry, "job-1");

    let mut classifier = ContentClassifier::new();
    let mut spans = classifier.feed("<thinking>plan</thinking><read_file><path>a.rs</path>");
    spans.extend(classifier.feed("</read_file>"));
    for span in &spans {
        assert!(emitter.content(span));
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["contentType"], "thinking");
    assert_eq!(events[0]["message"], "plan");
    assert!(events[0].get("toolName").is_none());
    assert_eq!(events[1]["contentType"], "systemParam");
    assert_eq!(events[1]["toolName"], "read_file");
    assert_eq!(events[1]["message"], "<path>a.rs</path>");
}

#[tokio::test]
async fn emitters_for_the_same_job_share_one_lifecycle() {
    let registry = test_registry();
    let (sink, first) = open_job(&registry, "job-1");
    let second = EventEmitter::new("job-1", std::sync::Arc::clone(&registry));

    assert!(first.completion("done", None));
    assert!(!second.error(&"other worker failed"));

    assert_eq!(sink.event_types(), vec!["completion"]);
    assert_eq!(second.job_id(), "job-1");
}

#[tokio::test]
async fn emitter_without_stream_reports_false() {
    let registry = test_registry();
    let emitter = EventEmitter::new("nobody", registry);

    assert!(!emitter.start("hello"));
    assert!(!emitter.information("hello"));
    assert!(!emitter.completion("done", None));
    assert!(!emitter.close());
}
