//! @ai:module:intent Channel-backed event sink that also reports consumer disconnects
//! @ai:module:layer infrastructure
//! @ai:module:public_api EventSink
//! @ai:module:stateless false

use crate::error::StreamError;
use crate::events::{BenchEvent, EventPayload};
use std::future::Future;
use tokio::sync::mpsc;

/// @ai:intent Producer half of a run's event stream
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<BenchEvent>,
}

impl EventSink {
    /// @ai:intent Create a bounded sink and its consumer
    /// @ai:effects pure
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BenchEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// @ai:intent Timestamp and send an event, waiting for buffer space
    /// @ai:effects channel:write
    pub async fn emit(&self, payload: impl Into<EventPayload>) -> Result<(), StreamError> {
        self.tx
            .send(BenchEvent::now(payload))
            .await
            .map_err(|_| StreamError::ConsumerClosed)
    }

    /// Resolves once the consumer has gone away
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// @ai:intent Drive `fut` unless the consumer disconnects first; `fut` is dropped on disconnect
    /// @ai:effects channel:read
    pub async fn until_closed<F: Future>(&self, fut: F) -> Result<F::Output, StreamError> {
        tokio::select! {
            biased;
            _ = self.tx.closed() => Err(StreamError::ConsumerClosed),
            output = fut => Ok(output),
        }
    }
}
