use std::convert::Infallible;

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{
        header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{HostError, Result};
use crate::events::{EventSink, EventStreamer};
use crate::host::Host;

pub const EVENT_STREAM: &str = "text/event-stream";

/// Chunks in flight between the streamer and hyper.
const BODY_BUFFER: usize = 16;

/// Comment frame sent for a flush with nothing buffered. Clients ignore it.
pub const SUBSCRIBED: &[u8] = b":\n\n";

/// True if the request's `Accept` header asks for an event stream.
pub fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains(EVENT_STREAM))
}

/// [`EventSink`] backed by a streaming response body.
///
/// Frames are buffered until `flush`, which sends them to hyper as one body
/// chunk. A flush with nothing buffered sends the [`SUBSCRIBED`] comment, so
/// the stream's opening is visible on the wire before the first event. Hyper drops the body when the client disconnects, which closes the
/// channel and resolves [`EventSink::closed`].
pub struct BodySink {
    tx: mpsc::Sender<std::result::Result<Bytes, Infallible>>,
    buf: Vec<u8>,
}

impl BodySink {
    pub fn channel(capacity: usize) -> (Self, Body) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            tx,
            buf: Vec::new(),
        };
        (sink, Body::from_stream(ReceiverStream::new(rx)))
    }
}

#[async_trait]
impl EventSink for BodySink {
    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if self.tx.is_closed() {
            return Err(HostError::StreamWrite("client disconnected".to_string()));
        }
        self.buf.extend_from_slice(frame);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        let chunk = if self.buf.is_empty() {
            Bytes::from_static(SUBSCRIBED)
        } else {
            Bytes::from(std::mem::take(&mut self.buf))
        };
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| HostError::StreamWrite("client disconnected".to_string()))
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Subscribe to `key` and answer with a long-lived event stream.
///
/// The listener is registered before the response is returned, so every
/// event dispatched after the client sees the `200` is delivered.
pub fn stream_events(host: &Host, key: &str) -> Response {
    let subscription = host.subscribe(key);
    let (mut sink, body) = BodySink::channel(BODY_BUFFER);

    let key = key.to_string();
    tokio::spawn(async move {
        if let Err(e) = EventStreamer::run(subscription, &mut sink).await {
            tracing::warn!(key = %key, error = %e, "Event stream terminated");
        }
    });

    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}
