//! # Error Types
//!
//! Errors shared by the bus adapter and the conversation engine.

use thiserror::Error;

use crate::ids::Destination;

/// Errors raised by a message transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Nothing is listening on the destination.
    #[error("No listener registered on destination {0}")]
    NoListener(Destination),

    /// The transport has been closed.
    #[error("Transport closed")]
    Closed,

    /// The transport needs an async runtime that is not available.
    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    /// Any other delivery failure.
    #[error("Delivery to {destination} failed: {reason}")]
    DeliveryFailed {
        destination: Destination,
        reason: String,
    },
}
