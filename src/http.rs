//! HTTP/SSE surface for job streams.
//!
//! - `GET /jobs/{job_id}/events` opens the job's event stream
//!   (`text/event-stream`), replacing any previous connection for the job;
//! - `GET /stats` reports registry counts as JSON;
//! - `GET /health` answers `ok`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::GlobalConfig;
use crate::stream::transport::{sse_body_stream, sse_response};
use crate::stream::{ChannelSink, ConnectionRegistry, EventEmitter, StreamStats};
use crate::{AppError, Result};

/// Shared state handed to every HTTP handler.
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Registry owning every job stream.
    pub registry: Arc<ConnectionRegistry>,
}

impl AppState {
    /// Build state with a fresh registry from `config`.
    #[must_use]
    pub fn new(config: GlobalConfig) -> Self {
        let registry = ConnectionRegistry::new(config.streams.clone());
        Self {
            config: Arc::new(config),
            registry,
        }
    }

    /// Emitter for `job_id` bound to the shared registry.
    #[must_use]
    pub fn emitter(&self, job_id: impl Into<String>) -> EventEmitter {
        EventEmitter::new(job_id, Arc::clone(&self.registry))
    }
}

/// Handler for `GET /health`.
async fn health() -> &'static str {
    "ok"
}

/// Handler for `GET /stats`.
async fn stats(State(state): State<Arc<AppState>>) -> Json<StreamStats> {
    Json(state.registry.stats())
}

/// Handler for `GET /jobs/{job_id}/events`.
async fn open_stream(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    let (sink, rx) = ChannelSink::channel();
    match state.registry.open(&job_id, Arc::new(sink)) {
        Ok(connection) => {
            info!(job_id, connection_id = %connection.connection_id, "client attached");
            state.emitter(job_id).start("stream opened");
            sse_response(sse_body_stream(rx))
        }
        Err(AppError::Capacity(msg)) => (StatusCode::SERVICE_UNAVAILABLE, msg).into_response(),
        Err(err) => {
            error!(job_id, %err, "failed to open stream");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

/// Build the router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/jobs/{job_id}/events", get(open_stream))
        .with_state(state)
}

/// Start the HTTP/SSE server on `config.http_port` (loopback).
///
/// # Errors
///
/// Returns `AppError::Io` if the listener cannot be bound or the server
/// fails.
pub async fn serve_http(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], state.config.http_port));
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Io(format!("failed to bind HTTP on {bind}: {err}")))?;
    serve_listener(listener, state, ct).await
}

/// Serve on an already-bound listener until `ct` is cancelled.
///
/// Every open stream is closed once shutdown begins so long-lived SSE
/// responses do not hold the graceful shutdown open.
///
/// # Errors
///
/// Returns `AppError::Io` if the server fails.
pub async fn serve_listener(
    listener: TcpListener,
    state: Arc<AppState>,
    ct: CancellationToken,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|err| AppError::Io(format!("listener address unavailable: {err}")))?;
    info!(%addr, "starting HTTP/SSE stream server");

    let registry = Arc::clone(&state.registry);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            ct.cancelled().await;
            registry.close_all();
        })
        .await
        .map_err(|err| AppError::Io(format!("HTTP server error: {err}")))?;

    info!("HTTP/SSE stream server shut down");
    Ok(())
}
