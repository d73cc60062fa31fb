//! Client transport seam and the channel-backed SSE sink.
//!
//! The registry is the only writer of an [`EventSink`]. Writes are
//! synchronous pushes into the transport's own buffer; nothing here waits
//! for the bytes to reach the client.

use std::convert::Infallible;
use std::sync::{Mutex, PoisonError};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;

use crate::{AppError, Result};

/// Write side of one client connection.
pub trait EventSink: Send + Sync {
    /// Queue one complete frame for delivery.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` when the client is gone or the sink
    /// has already been ended.
    fn write(&self, frame: Bytes) -> Result<()>;

    /// Finish the stream. Frames already queued are still delivered.
    fn end(&self);

    /// Whether the sink can no longer accept frames.
    fn is_closed(&self) -> bool;
}

/// Sink backed by an unbounded channel whose receiver feeds an HTTP body.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl EventSink for ChannelSink {
    fn write(&self, frame: Bytes) -> Result<()> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return Err(AppError::Transport("stream already ended".into()));
        };
        tx.send(frame)
            .map_err(|_| AppError::Transport("client disconnected".into()))
    }

    fn end(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_none_or(mpsc::UnboundedSender::is_closed)
    }
}

/// Turn the receiving half of a [`ChannelSink`] into an HTTP body stream.
///
/// The stream ends once the sink is ended and every queued frame is read.
pub fn sse_body_stream(
    rx: mpsc::UnboundedReceiver<Bytes>,
) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + Send + 'static {
    futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (Ok(frame), rx))
    })
}

/// Wrap a frame stream in a `text/event-stream` response.
pub fn sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = std::result::Result<Bytes, Infallible>> + Send + 'static,
{
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    (headers, Body::from_stream(stream)).into_response()
}
