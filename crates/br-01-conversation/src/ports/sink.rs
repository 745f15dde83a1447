//! Event sink port.

use crate::domain::OperationEvent;

/// Caller-supplied consumer of a conversation's ordered events.
///
/// `emit` is called while the conversation is locked: implementations must
/// return promptly and never block on the consumer. Events may keep arriving
/// after the consumer stopped listening; dropping them is fine.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OperationEvent);
}

/// Sink that discards everything. For fire-and-forget operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: OperationEvent) {}
}
