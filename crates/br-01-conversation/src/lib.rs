//! BR-01 Conversation Engine - one state machine per distributed operation.
//!
//! Every client-visible operation (get, put, replace, delete, listing,
//! checksums, audit trails, status) runs as a conversation with the
//! contributors (pillars) holding a collection.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    CONVERSATION ENGINE (br-01)                      │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │   caller ──start──→ ┌──────────────────────┐                        │
//! │                     │ ConversationMediator │ ←── dispatch ── bus    │
//! │                     │  (correlation map)   │                        │
//! │                     └──────────┬───────────┘                        │
//! │                                │ one per correlation id             │
//! │                     ┌──────────┴───────────┐                        │
//! │                     │    Conversation      │ ──send──→ bus          │
//! │                     │ Identifying          │                        │
//! │                     │  → Selecting         │ ←─timer── Scheduler    │
//! │                     │  → Requesting        │                        │
//! │                     │  → Completing        │ ──emit──→ EventSink    │
//! │                     │  → Terminated        │                        │
//! │                     └──────────────────────┘                        │
//! │        per-operation logic plugged in as an OperationPolicy         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - Exactly one terminal event (`Complete` or `Failed`) per conversation,
//!   always the last one.
//! - Message delivery and timer callbacks for one conversation are
//!   serialized; different conversations run in parallel.
//! - Late, duplicate and foreign messages are discarded, never errors.
//!
//! # Usage
//!
//! ```ignore
//! use br_01_conversation::{ClientSettings, ConversationMediator, ConversationParams, TokioScheduler};
//!
//! let settings = ClientSettings::load("client.toml")?;
//! let mediator = ConversationMediator::new(settings, bus, Arc::new(TokioScheduler::current()?));
//! mediator.start()?;
//! let mut handle = mediator.start_with_handle(policy, ConversationParams::new(collection, args))?;
//! let terminal = handle.wait_for_terminal().await;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adapters::{event_channel, ChannelEventSink, ManualScheduler, OperationHandle, TokioScheduler};
pub use config::{
    ClientSettings, CollectionSettings, ConfigError, ConversationTimeouts, OperationTimeoutOverride,
    TimeoutSettings,
};
pub use domain::{
    AggregateOutcome, ContributorTracker, ConversationPhase, EventPayload, FailureReason,
    Identification, IdentifyVerdict, MediatorError, Membership, OperationEvent,
    OperationEventType, PolicyError, SelectionError, SelectionStrategy, SuccessCriterion,
    TerminalReason, TimerKind,
};
pub use ports::{
    ConversationContext, EventSink, NullEventSink, OperationPolicy, Scheduler, TimerCallback,
    TimerHandle,
};
pub use service::{
    cleanup_task, Conversation, ConversationMediator, ConversationParams, ConversationSnapshot,
    DispatchOutcome, HandleOutcome, IgnoreReason, MediatorStats, ParticipantScope, Participants,
};
