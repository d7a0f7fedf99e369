//! Outbound event channel.
//!
//! Events are delivered in order, one at a time, and are never replayed: there
//! is no history and no cursor. A caller therefore cannot tell a retried
//! attempt's events apart from ones an earlier attempt already delivered.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Terminal error record, serialized as `{"status": "error", "error": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub status: String,
    pub error: String,
}

/// A single unit emitted to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Error(ErrorRecord),
    Content(Value),
}

impl StreamEvent {
    /// Build a terminal error event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorRecord {
            status: "error".to_string(),
            error: message.into(),
        })
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// The receiving side has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event stream closed by caller")]
pub struct SinkClosed;

/// Write-only, append-only channel towards the caller.
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
    sent: usize,
}

/// Create a connected sink/stream pair.
///
/// The channel holds a single event so the producer stays in lock-step with
/// the consumer's pulls.
#[must_use]
pub fn event_channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::channel(1);
    (
        EventSink { tx, sent: 0 },
        EventStream {
            inner: ReceiverStream::new(rx),
        },
    )
}

impl EventSink {
    /// Forward a content event.
    ///
    /// # Errors
    /// Returns [`SinkClosed`] once the caller has dropped the stream.
    pub async fn emit(&mut self, content: Value) -> Result<(), SinkClosed> {
        self.tx
            .send(StreamEvent::Content(content))
            .await
            .map_err(|_| SinkClosed)?;
        self.sent += 1;
        Ok(())
    }

    /// Emit exactly one terminal error event and close the channel.
    pub async fn fail(self, message: impl Into<String>) {
        let message = message.into();
        if self.tx.send(StreamEvent::error(message.clone())).await.is_err() {
            tracing::debug!(%message, "Caller gone before terminal error could be delivered");
        }
    }

    /// Number of content events forwarded so far.
    #[must_use]
    pub const fn sent(&self) -> usize {
        self.sent
    }

    /// Resolves once the caller has dropped the stream.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(feature = "sse")]
impl StreamEvent {
    /// Render as an SSE `data:` frame carrying the JSON event.
    ///
    /// # Errors
    /// Returns error if the event cannot be serialized.
    pub fn to_sse_event(&self) -> Result<axum::response::sse::Event, axum::Error> {
        axum::response::sse::Event::default().json_data(self)
    }
}

/// Pull side of the event channel.
pub struct EventStream {
    inner: ReceiverStream<StreamEvent>,
}

impl EventStream {
    /// SSE stream (requires `sse` feature).
    #[cfg(feature = "sse")]
    #[must_use]
    pub fn sse_stream(self) -> futures::stream::BoxStream<'static, Result<axum::response::sse::Event, axum::Error>> {
        use futures::StreamExt;
        self.map(|event| event.to_sse_event()).boxed()
    }
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
