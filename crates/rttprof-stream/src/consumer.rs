//! One-way hand-off of decoded events to an external consumer.

use rttprof_core::{Event, EventTypeRegistry};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Messages delivered to the consumer, in this order: one `Registry`, any
/// number of `Event`s, exactly one `EndOfStream`.
#[derive(Debug, Clone)]
pub enum StreamMessage {
    Registry(Arc<EventTypeRegistry>),
    Event(Event),
    EndOfStream,
}

/// Sending half of the consumer queue. Sends wait while the queue is full.
#[derive(Debug, Default)]
pub struct ConsumerHandle {
    tx: Option<mpsc::Sender<StreamMessage>>,
    ended: bool,
}

/// Create a bounded consumer queue.
pub fn consumer_channel(capacity: usize) -> (ConsumerHandle, mpsc::Receiver<StreamMessage>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ConsumerHandle {
            tx: Some(tx),
            ended: false,
        },
        rx,
    )
}

impl ConsumerHandle {
    /// A handle with nobody listening.
    pub fn detached() -> Self {
        Self::default()
    }

    pub async fn send_registry(&mut self, registry: Arc<EventTypeRegistry>) {
        self.send(StreamMessage::Registry(registry)).await;
    }

    pub async fn send_event(&mut self, event: Event) {
        self.send(StreamMessage::Event(event)).await;
    }

    /// Send the end-of-stream marker. Later calls do nothing.
    pub async fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.send(StreamMessage::EndOfStream).await;
        self.tx = None;
    }

    async fn send(&mut self, msg: StreamMessage) {
        let Some(tx) = self.tx.as_ref() else {
            return;
        };
        if tx.send(msg).await.is_err() {
            // Receiver dropped, keep streaming
            warn!("Event consumer went away, no longer forwarding events");
            self.tx = None;
        }
    }
}
