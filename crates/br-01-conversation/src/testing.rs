//! Test doubles for the engine's collaborators.
//!
//! Available to this crate's tests and, with the `testing` feature, to other
//! crates' tests.

use parking_lot::Mutex;
use shared_bus::{ListenerHandle, MessageListener, MessageTransport};
use shared_types::{
    ComponentId, Destination, Message, MessageBody, OperationKind, OperationResult, ResponseCode,
    ResponseInfo, TransportError,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{OperationEvent, OperationEventType, SelectionStrategy, SuccessCriterion};
use crate::ports::{ConversationContext, EventSink, OperationPolicy};

type Registrations = Arc<Mutex<Vec<(u64, Destination, Arc<dyn MessageListener>)>>>;

/// Transport that records every send and delivers only on request.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(Destination, Message)>>,
    failing: Mutex<HashSet<Destination>>,
    listeners: Registrations,
    next_listener_id: AtomicU64,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later send to `destination` fail.
    pub fn fail_destination(&self, destination: Destination) {
        self.failing.lock().insert(destination);
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<(Destination, Message)> {
        self.sent.lock().clone()
    }

    /// Messages sent to one destination.
    pub fn sent_to(&self, destination: &Destination) -> Vec<Message> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| to == destination)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Hand a message to every listener on `destination`, on this thread.
    ///
    /// Returns the number of listeners reached.
    pub fn deliver(&self, destination: &Destination, message: Message) -> usize {
        let targets: Vec<_> = self
            .listeners
            .lock()
            .iter()
            .filter(|(_, registered, _)| registered == destination)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect();
        for listener in &targets {
            listener.on_message(message.clone());
        }
        targets.len()
    }
}

impl MessageTransport for RecordingTransport {
    fn send(&self, destination: &Destination, message: Message) -> Result<(), TransportError> {
        if self.failing.lock().contains(destination) {
            return Err(TransportError::DeliveryFailed {
                destination: destination.clone(),
                reason: "injected failure".into(),
            });
        }
        self.sent.lock().push((destination.clone(), message));
        Ok(())
    }

    fn subscribe(
        &self,
        destination: &Destination,
        listener: Arc<dyn MessageListener>,
    ) -> Result<ListenerHandle, TransportError> {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .push((id, destination.clone(), listener));

        let listeners = Arc::clone(&self.listeners);
        Ok(ListenerHandle::new(id, destination.clone(), move || {
            listeners.lock().retain(|(registered, _, _)| *registered != id);
        }))
    }
}

/// Sink that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<OperationEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OperationEvent> {
        self.events.lock().clone()
    }

    pub fn event_types(&self) -> Vec<OperationEventType> {
        self.events.lock().iter().map(|e| e.event_type).collect()
    }

    pub fn last(&self) -> Option<OperationEvent> {
        self.events.lock().last().cloned()
    }

    pub fn terminal_count(&self) -> usize {
        self.events.lock().iter().filter(|e| e.is_terminal()).count()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: OperationEvent) {
        self.events.lock().push(event);
    }
}

/// Policy with a fixed strategy and criterion, for engine tests.
#[derive(Debug, Clone)]
pub struct StaticPolicy {
    operation: OperationKind,
    strategy: SelectionStrategy,
    criterion: SuccessCriterion,
}

impl StaticPolicy {
    pub fn new(operation: OperationKind, strategy: SelectionStrategy) -> Self {
        Self {
            operation,
            strategy,
            criterion: SuccessCriterion::AllSelected,
        }
    }

    pub fn with_criterion(mut self, criterion: SuccessCriterion) -> Self {
        self.criterion = criterion;
        self
    }
}

impl OperationPolicy for StaticPolicy {
    fn operation(&self) -> OperationKind {
        self.operation
    }

    fn selection(&self, _ctx: &ConversationContext) -> SelectionStrategy {
        self.strategy.clone()
    }

    fn success_criterion(&self) -> SuccessCriterion {
        self.criterion
    }
}

/// Private destination the reply helpers give a contributor.
pub fn inbox(contributor: &str) -> Destination {
    Destination::new(format!("{contributor}.inbox"))
}

/// Identify response from `contributor` to `request`.
pub fn identify_reply(
    request: &Message,
    contributor: &str,
    code: ResponseCode,
    time_to_deliver: Option<Duration>,
) -> Message {
    request.reply(
        ComponentId::new(contributor),
        inbox(contributor),
        MessageBody::IdentifyResponse {
            operation: request.body.operation(),
            info: ResponseInfo::new(code),
            time_to_deliver,
        },
    )
}

/// Progress response from `contributor` to `request`.
pub fn progress_reply(request: &Message, contributor: &str, code: ResponseCode) -> Message {
    request.reply(
        ComponentId::new(contributor),
        inbox(contributor),
        MessageBody::ProgressResponse {
            operation: request.body.operation(),
            info: ResponseInfo::new(code),
        },
    )
}

/// Final response from `contributor` to `request`.
pub fn final_reply(
    request: &Message,
    contributor: &str,
    code: ResponseCode,
    result: Option<OperationResult>,
) -> Message {
    request.reply(
        ComponentId::new(contributor),
        inbox(contributor),
        MessageBody::FinalResponse {
            operation: request.body.operation(),
            info: ResponseInfo::new(code),
            result,
        },
    )
}
