//! # In-Memory Message Bus
//!
//! Single-process implementation of [`MessageTransport`].

use crate::transport::{ListenerHandle, MessageListener, MessageTransport};
use crate::DEFAULT_CHANNEL_CAPACITY;
use shared_types::{Destination, Message, TransportError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// In-memory implementation of the message bus.
///
/// Uses one `tokio::sync::broadcast` channel per destination for
/// multi-producer, multi-consumer semantics. Each listener gets its own
/// delivery task, so messages to one destination reach a listener in send
/// order. Suitable for single-process operation and tests; distributed
/// deployments would use a broker-backed implementation.
pub struct InMemoryMessageBus {
    /// Broadcast sender per destination.
    destinations: Arc<RwLock<HashMap<Destination, broadcast::Sender<Message>>>>,

    /// Total messages accepted for delivery.
    messages_sent: AtomicU64,

    /// Messages sent to a destination without listeners.
    messages_undelivered: AtomicU64,

    /// Next listener registration id.
    next_listener_id: AtomicU64,

    /// Set once `close` has been called.
    closed: AtomicBool,

    /// Channel capacity per destination.
    capacity: usize,
}

impl InMemoryMessageBus {
    /// Create a new in-memory bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            destinations: Arc::new(RwLock::new(HashMap::new())),
            messages_sent: AtomicU64::new(0),
            messages_undelivered: AtomicU64::new(0),
            next_listener_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            capacity,
        }
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of listeners currently registered on a destination.
    #[must_use]
    pub fn listener_count(&self, destination: &Destination) -> usize {
        self.destinations
            .read()
            .ok()
            .and_then(|map| map.get(destination).map(broadcast::Sender::receiver_count))
            .unwrap_or(0)
    }

    /// Total messages accepted by `send`.
    #[must_use]
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    /// Messages that reached no listener.
    #[must_use]
    pub fn messages_undelivered(&self) -> u64 {
        self.messages_undelivered.load(Ordering::Relaxed)
    }

    /// Close the bus. Delivery tasks end and further sends fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut map) = self.destinations.write() {
            map.clear();
        }
        debug!("In-memory message bus closed");
    }

    fn sender_for(&self, destination: &Destination) -> Option<broadcast::Sender<Message>> {
        if let Ok(map) = self.destinations.read() {
            if let Some(sender) = map.get(destination) {
                return Some(sender.clone());
            }
        }
        let mut map = self.destinations.write().ok()?;
        Some(
            map.entry(destination.clone())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .clone(),
        )
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageTransport for InMemoryMessageBus {
    fn send(&self, destination: &Destination, message: Message) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let kind = message.kind();
        let correlation_id = message.correlation_id;

        let sender = self
            .destinations
            .read()
            .map_err(|_| TransportError::DeliveryFailed {
                destination: destination.clone(),
                reason: "destination table poisoned".to_string(),
            })?
            .get(destination)
            .cloned();

        self.messages_sent.fetch_add(1, Ordering::Relaxed);

        let delivered = sender.map_or(0, |sender| sender.send(message).unwrap_or(0));
        if delivered == 0 {
            self.messages_undelivered.fetch_add(1, Ordering::Relaxed);
            warn!(
                destination = %destination,
                kind = ?kind,
                correlation_id = %correlation_id,
                "Message dropped (no listeners)"
            );
        } else {
            debug!(
                destination = %destination,
                kind = ?kind,
                correlation_id = %correlation_id,
                listeners = delivered,
                "Message sent"
            );
        }
        Ok(())
    }

    fn subscribe(
        &self,
        destination: &Destination,
        listener: Arc<dyn MessageListener>,
    ) -> Result<ListenerHandle, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let runtime = Handle::try_current().map_err(|e| TransportError::NoRuntime(e.to_string()))?;
        let sender = self.sender_for(destination).ok_or_else(|| TransportError::DeliveryFailed {
            destination: destination.clone(),
            reason: "destination table poisoned".to_string(),
        })?;

        let mut receiver = sender.subscribe();
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let task_destination = destination.clone();

        let task = runtime.spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => listener.on_message(message),
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        warn!(
                            destination = %task_destination,
                            lagged = count,
                            "Listener lagged, some messages dropped"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        debug!(destination = %destination, listener_id = id, "Listener registered");

        let abort = task.abort_handle();
        let cancel_destination = destination.clone();
        Ok(ListenerHandle::new(id, destination.clone(), move || {
            abort.abort();
            debug!(destination = %cancel_destination, listener_id = id, "Listener removed");
        }))
    }
}
