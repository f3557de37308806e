use async_trait::async_trait;

use crate::error::{HostError, Result};
use crate::events::Subscription;
use crate::job::JobEvent;

/// Outbound side of an event stream.
///
/// A transport must support both an explicit flush and a disconnect
/// notification to be streamable.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Queue one encoded frame.
    async fn write_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Push everything written so far to the client.
    async fn flush(&mut self) -> Result<()>;

    /// Resolves once the client has gone away.
    async fn closed(&self);
}

/// Encode one event as a server-sent-events frame: `data: <json>\n\n`.
pub fn encode_frame(event: &JobEvent) -> Result<Vec<u8>> {
    let json =
        serde_json::to_vec(event).map_err(|e| HostError::StreamWrite(format!("encode: {e}")))?;
    let mut frame = Vec::with_capacity(json.len() + 8);
    frame.extend_from_slice(b"data: ");
    frame.extend_from_slice(&json);
    frame.extend_from_slice(b"\n\n");
    Ok(frame)
}

pub struct EventStreamer;

impl EventStreamer {
    /// Forward events from `subscription` to `sink`, one flushed frame per event.
    ///
    /// Returns `Ok` when the client disconnects or the listener is removed,
    /// and `HostError::StreamWrite` when a write fails first. The listener is
    /// removed from the registry on every exit path.
    pub async fn run<S: EventSink>(mut subscription: Subscription, sink: &mut S) -> Result<()> {
        let result = Self::pump(&mut subscription, sink).await;
        subscription.unsubscribe();
        result
    }

    async fn pump<S: EventSink>(subscription: &mut Subscription, sink: &mut S) -> Result<()> {
        // Zero-event flush tells the client it is subscribed.
        sink.flush().await?;

        loop {
            tokio::select! {
                _ = sink.closed() => {
                    tracing::debug!(
                        key = subscription.key(),
                        listener_id = subscription.id(),
                        "Client disconnected from event stream"
                    );
                    return Ok(());
                }
                event = subscription.recv() => {
                    let Some(event) = event else {
                        return Ok(());
                    };
                    let frame = encode_frame(&event)?;
                    sink.write_frame(&frame).await?;
                    sink.flush().await?;
                }
            }
        }
    }
}
