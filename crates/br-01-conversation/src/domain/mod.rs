//! Domain layer: pure conversation bookkeeping, no I/O.

pub mod errors;
pub mod events;
pub mod outcome;
pub mod phase;
pub mod selection;
pub mod tracker;

pub use errors::{MediatorError, PolicyError, SelectionError, TrackerError};
pub use events::{EventPayload, OperationEvent, OperationEventType};
pub use outcome::{AggregateOutcome, SuccessCriterion, TerminalReason};
pub use phase::{ConversationPhase, TimerKind};
pub use selection::SelectionStrategy;
pub use tracker::{
    ContributorTracker, FailureReason, Identification, IdentifyVerdict, Membership, TrackerUpdate,
};
