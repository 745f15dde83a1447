//! Adapters implementing the engine's ports.

pub mod event_channel;
pub mod manual_scheduler;
pub mod tokio_scheduler;

pub use event_channel::{event_channel, ChannelEventSink, OperationHandle};
pub use manual_scheduler::ManualScheduler;
pub use tokio_scheduler::TokioScheduler;
