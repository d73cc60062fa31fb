//! Integration tests for the HTTP/SSE surface.
//!
//! Each test binds its own ephemeral port and serves the router on it, so
//! tests run independently of any running instance.

use std::sync::Arc;

use agent_stream::config::{GlobalConfig, StreamConfig};
use agent_stream::http::{serve_listener, AppState};
use tokio_util::sync::CancellationToken;

use super::test_helpers::test_stream_config;

/// Serve `state` on an ephemeral loopback port, returning the base URL.
///
/// Caller must cancel `ct` to shut the server down.
async fn spawn_server(streams: StreamConfig) -> (String, Arc<AppState>, CancellationToken) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");

    let config = GlobalConfig {
        http_port: addr.port(),
        streams,
    };
    let state = Arc::new(AppState::new(config));
    let ct = CancellationToken::new();

    let server_state = Arc::clone(&state);
    let server_ct = ct.clone();
    tokio::spawn(async move {
        let _ = serve_listener(listener, server_state, server_ct).await;
    });

    (format!("http://{addr}"), state, ct)
}

#[tokio::test]
async fn health_returns_ok() {
    let (base_url, _, ct) = spawn_server(test_stream_config()).await;

    let resp = reqwest::get(format!("{base_url}/health"))
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.expect("body"), "ok");

    ct.cancel();
}

#[tokio::test]
async fn stats_reports_open_streams() {
    let (base_url, _, ct) = spawn_server(test_stream_config()).await;

    let stream = reqwest::get(format!("{base_url}/jobs/job-1/events"))
        .await
        .expect("open stream");
    assert_eq!(stream.status(), 200);

    let stats: serde_json::Value = reqwest::get(format!("{base_url}/stats"))
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["active"], 1);
    assert_eq!(stats["inactive"], 0);

    drop(stream);
    ct.cancel();
}

#[tokio::test]
async fn event_stream_delivers_lifecycle_and_ends() {
    let (base_url, state, ct) = spawn_server(test_stream_config()).await;

    let resp = reqwest::get(format!("{base_url}/jobs/job-1/events"))
        .await
        .expect("open stream");
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().expect("ascii"),
        "text/event-stream"
    );
    assert_eq!(
        resp.headers()["cache-control"].to_str().expect("ascii"),
        "no-cache"
    );

    let emitter = state.emitter("job-1");
    assert!(emitter.progress("working", Some(50)));
    assert!(emitter.completion("finished", None));

    // The body ends once the shutdown sequence closes the connection.
    let body = resp.text().await.expect("body");
    let types: Vec<String> = body
        .split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .map(|json| {
            let event: serde_json::Value = serde_json::from_str(json).expect("event json");
            event["type"].as_str().expect("type").to_owned()
        })
        .collect();
    assert_eq!(types, vec!["start", "progress", "completion", "stream_end"]);
    assert!(state.registry.state("job-1").is_none());

    ct.cancel();
}

#[tokio::test]
async fn capacity_exhaustion_returns_503() {
    let (base_url, state, ct) = spawn_server(StreamConfig {
        max_concurrent_streams: 1,
        ..test_stream_config()
    })
    .await;

    let first = reqwest::get(format!("{base_url}/jobs/a/events"))
        .await
        .expect("open stream");
    assert_eq!(first.status(), 200);

    let second = reqwest::get(format!("{base_url}/jobs/b/events"))
        .await
        .expect("request");
    assert_eq!(second.status(), 503);
    assert!(second.text().await.expect("body").contains("concurrent streams"));

    assert!(state.registry.is_active("a"));

    drop(first);
    ct.cancel();
}

#[tokio::test]
async fn shutdown_closes_open_streams() {
    let (base_url, state, ct) = spawn_server(test_stream_config()).await;

    let resp = reqwest::get(format!("{base_url}/jobs/job-1/events"))
        .await
        .expect("open stream");
    assert_eq!(resp.status(), 200);

    ct.cancel();

    let body = resp.text().await.expect("body");
    assert!(body.starts_with("data: "));
    assert_eq!(state.registry.stats().total, 0);
}
