//! Service layer: the conversation state machine and its mediator.

pub mod conversation;
pub mod mediator;

#[cfg(test)]
mod properties;

pub use conversation::{
    Conversation, ConversationSetup, ConversationSnapshot, HandleOutcome, IgnoreReason,
    Participants, TerminationHook,
};
pub use mediator::{
    cleanup_task, ConversationMediator, ConversationParams, DispatchOutcome, MediatorStats,
    ParticipantScope,
};
