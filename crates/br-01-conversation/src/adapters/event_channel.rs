//! Bounded per-operation event channel.
//!
//! The engine side (`ChannelEventSink`) only ever pushes with `try_send`;
//! the caller side (`OperationHandle`) pulls at its own pace. One slot beyond
//! the requested capacity is held back for the terminal event.

use br_telemetry::EVENTS_DROPPED;
use shared_types::CorrelationId;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::domain::OperationEvent;
use crate::ports::EventSink;

/// Create a sink and the receiver of its events.
pub fn event_channel(capacity: usize) -> (ChannelEventSink, mpsc::Receiver<OperationEvent>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1) + 1);
    (
        ChannelEventSink {
            sender,
            dropped: AtomicU64::new(0),
        },
        receiver,
    )
}

/// Event sink backed by a bounded tokio channel.
///
/// A full buffer drops non-terminal events with a warning. The terminal event
/// always has a free slot. A closed receiver is ignored.
#[derive(Debug)]
pub struct ChannelEventSink {
    sender: mpsc::Sender<OperationEvent>,
    dropped: AtomicU64,
}

impl ChannelEventSink {
    /// Events dropped because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: OperationEvent) {
        if self.sender.is_closed() {
            return;
        }
        // Last free slot belongs to the terminal event.
        if !event.is_terminal() && self.sender.capacity() <= 1 {
            return self.drop_event(&event);
        }
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => self.drop_event(&event),
            // Caller stopped listening.
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

impl ChannelEventSink {
    fn drop_event(&self, event: &OperationEvent) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        EVENTS_DROPPED.inc();
        warn!(
            correlation_id = %event.correlation_id,
            event = %event.event_type,
            "Event subscriber is not keeping up, dropping event"
        );
    }
}

/// Caller's end of a started operation.
#[derive(Debug)]
pub struct OperationHandle {
    correlation_id: CorrelationId,
    receiver: mpsc::Receiver<OperationEvent>,
}

impl OperationHandle {
    pub fn new(correlation_id: CorrelationId, receiver: mpsc::Receiver<OperationEvent>) -> Self {
        Self {
            correlation_id,
            receiver,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Next event, or `None` once the conversation is gone and the buffer is drained.
    pub async fn next_event(&mut self) -> Option<OperationEvent> {
        self.receiver.recv().await
    }

    /// Next buffered event without waiting.
    pub fn try_next_event(&mut self) -> Option<OperationEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Skip to the terminal event.
    pub async fn wait_for_terminal(&mut self) -> Option<OperationEvent> {
        while let Some(event) = self.next_event().await {
            if event.is_terminal() {
                return Some(event);
            }
        }
        None
    }

    /// Every event up to and including the terminal one.
    pub async fn collect_until_terminal(&mut self) -> Vec<OperationEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }

    /// Consume the handle as a `Stream` of events.
    pub fn into_stream(self) -> ReceiverStream<OperationEvent> {
        ReceiverStream::new(self.receiver)
    }
}
