//! Ports: the seams between the engine and its collaborators.
//!
//! - `policy`    - per-operation logic (driven by the conversation)
//! - `scheduler` - timer service
//! - `sink`      - consumer of lifecycle events
//!
//! The message transport port lives in `shared-bus`.

pub mod policy;
pub mod scheduler;
pub mod sink;

pub use policy::{ConversationContext, OperationPolicy};
pub use scheduler::{Scheduler, TimerCallback, TimerHandle};
pub use sink::{EventSink, NullEventSink};
