//! # Shared Types Crate
//!
//! This crate contains the identifiers, the `Message` envelope and the full
//! message catalogue exchanged between clients and contributors (pillars).
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Every type crossing the message bus is defined here.
//! - **Closed Catalogue**: Message bodies are a tagged union (`MessageBody`), so
//!   receivers dispatch with a single `match` instead of one handler per type.
//! - **Correlation Is Routing**: The `correlation_id` of the envelope is the only
//!   key used to route a response back to the conversation that asked for it.

pub mod envelope;
pub mod errors;
pub mod ids;
pub mod operations;
pub mod response;

pub use envelope::{Message, MessageBody, MessageKind};
pub use errors::*;
pub use ids::*;
pub use operations::*;
pub use response::{ResponseCode, ResponseInfo};

/// Current protocol version stamped on every outgoing message.
pub const PROTOCOL_VERSION: u16 = 3;

/// Oldest protocol version this implementation still understands.
pub const PROTOCOL_MIN_VERSION: u16 = 2;
