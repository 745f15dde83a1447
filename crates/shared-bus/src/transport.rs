//! # Transport Port
//!
//! Defines the sending and listening sides of the message bus.

use shared_types::{Destination, Message, TransportError};
use std::fmt;
use std::sync::Arc;

/// Receives messages delivered to a destination.
pub trait MessageListener: Send + Sync {
    /// Handle one delivered message.
    fn on_message(&self, message: Message);
}

/// Trait for the message bus used by the conversation engine.
///
/// Implementations MUST NOT invoke listeners synchronously from `send`:
/// callers may hold per-conversation locks while sending.
pub trait MessageTransport: Send + Sync {
    /// Send a message to a destination.
    ///
    /// Sending to a destination nobody listens on is not an error; the
    /// message is simply not delivered.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the transport cannot accept the message.
    fn send(&self, destination: &Destination, message: Message) -> Result<(), TransportError>;

    /// Register a listener on a destination.
    ///
    /// The listener stays registered until the returned handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the listener cannot be registered.
    fn subscribe(
        &self,
        destination: &Destination,
        listener: Arc<dyn MessageListener>,
    ) -> Result<ListenerHandle, TransportError>;
}

type CancelFn = Box<dyn FnOnce() + Send + Sync>;

/// A listener registration.
///
/// When dropped, the listener is automatically removed.
pub struct ListenerHandle {
    id: u64,
    destination: Destination,
    cancel: Option<CancelFn>,
}

impl ListenerHandle {
    /// Create a handle that runs `cancel` when dropped.
    pub fn new(id: u64, destination: Destination, cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            destination,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Create a handle with nothing to clean up.
    pub fn detached(id: u64, destination: Destination) -> Self {
        Self {
            id,
            destination,
            cancel: None,
        }
    }

    /// Registration id, unique per transport.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Destination the listener is registered on.
    #[must_use]
    pub fn destination(&self) -> &Destination {
        &self.destination
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("id", &self.id)
            .field("destination", &self.destination)
            .finish()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
