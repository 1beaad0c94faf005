//! Bounded push channel between the publisher and a single consumer
//!
//! Either side can end the stream: the publisher with [`PushSender::close`]
//! once it has emitted its final event, the consumer by dropping or
//! cancelling the [`PushReceiver`]. Pushing into a closed channel is not an
//! error; the publisher checks [`PushSender::is_closed`] to stop early.

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::StreamEvent;

/// Result of a push attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    /// The consumer has gone away or the stream was closed
    Closed,
}

pub struct PushChannel;

impl PushChannel {
    /// Create a channel holding at most `capacity` undelivered events
    pub fn bounded(capacity: usize) -> (PushSender, PushReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let closed = CancellationToken::new();
        (
            PushSender {
                tx,
                closed: closed.clone(),
            },
            PushReceiver { rx, closed },
        )
    }
}

/// Producer half; cheap to clone into per-location tasks
#[derive(Debug, Clone)]
pub struct PushSender {
    tx: mpsc::Sender<StreamEvent>,
    closed: CancellationToken,
}

impl PushSender {
    /// Deliver an event, waiting for buffer space if the consumer is slow
    pub async fn push(&self, event: StreamEvent) -> PushOutcome {
        if self.closed.is_cancelled() {
            debug!(event = event.event_type(), "Dropping event pushed after close");
            return PushOutcome::Closed;
        }

        let event_type = event.event_type();
        tokio::select! {
            result = self.tx.send(event) => match result {
                Ok(()) => PushOutcome::Delivered,
                Err(_) => {
                    debug!(event = event_type, "Consumer disconnected, event dropped");
                    PushOutcome::Closed
                }
            },
            _ = self.closed.cancelled() => {
                debug!(event = event_type, "Stream closed while pushing, event dropped");
                PushOutcome::Closed
            }
        }
    }

    /// End the stream; events already buffered are still delivered
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// True once the stream was closed or the consumer went away
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves once the stream is closed from either side
    pub async fn closed(&self) {
        tokio::select! {
            _ = self.tx.closed() => {}
            _ = self.closed.cancelled() => {}
        }
    }
}

/// Consumer half
#[derive(Debug)]
pub struct PushReceiver {
    rx: mpsc::Receiver<StreamEvent>,
    closed: CancellationToken,
}

impl PushReceiver {
    /// Next event, or `None` once the stream is closed and drained
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        loop {
            if let Ok(event) = self.rx.try_recv() {
                return Some(event);
            }
            if self.closed.is_cancelled() {
                return None;
            }
            tokio::select! {
                event = self.rx.recv() => return event,
                _ = self.closed.cancelled() => continue,
            }
        }
    }

    /// Stop receiving; pending and future pushes report `Closed`
    pub fn cancel(&mut self) {
        self.closed.cancel();
        self.rx.close();
    }

    pub fn into_stream(mut self) -> impl Stream<Item = StreamEvent> + Send + 'static {
        async_stream::stream! {
            while let Some(event) = self.recv().await {
                yield event;
            }
        }
    }
}

impl Drop for PushReceiver {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}
