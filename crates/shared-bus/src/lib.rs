//! # Shared Bus - Message Transport
//!
//! The narrow transport interface the conversation engine consumes, plus an
//! in-memory implementation.
//!
//! ## Model
//!
//! ```text
//! ┌──────────────┐  send(collection topic)   ┌──────────────┐
//! │    Client    │ ────────────────────────→ │ Contributors │
//! │  (mediator)  │                           │  (pillars)   │
//! │              │ ←──────────────────────── │              │
//! └──────────────┘  send(reply_to)           └──────────────┘
//! ```
//!
//! - Destinations are named; every listener on a destination receives every
//!   message sent to it (topic semantics).
//! - Listeners are invoked from a delivery task, never on the sender's stack,
//!   so a listener may send again without re-entering the sender.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod memory;
pub mod transport;

// Re-export main types
pub use memory::InMemoryMessageBus;
pub use shared_types::TransportError;
pub use transport::{ListenerHandle, MessageListener, MessageTransport};

/// Messages buffered per destination before slow listeners start lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
