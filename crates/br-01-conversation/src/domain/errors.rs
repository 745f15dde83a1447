//! Error types for the conversation engine.
//!
//! Normal conversation failures are never returned as errors: they end the
//! conversation with a `Failed` event. These errors cover refusals that happen
//! before a conversation exists, and contract breaches of policy code.

use shared_types::{CollectionId, ContributorId, OperationKind, TransportError};
use thiserror::Error;

/// Errors raised by operation policies.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// Arguments belong to another operation kind.
    #[error("policy for {expected} cannot handle {actual} arguments")]
    ArgumentMismatch {
        expected: OperationKind,
        actual: OperationKind,
    },

    /// Arguments are of the right kind but unusable.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The per-contributor outcomes could not be merged.
    #[error("cannot merge results: {0}")]
    Merge(String),
}

/// Why selection produced no contributor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no contributor available")]
    NoContributorAvailable,

    #[error("requested contributor not available: {0}")]
    RequestedContributorNotAvailable(ContributorId),
}

/// Contract breaches detected by the contributor tracker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("contributor {0} is not positively identified")]
    NotEligible(ContributorId),

    #[error("contributor {0} selected twice")]
    SelectedTwice(ContributorId),

    #[error("selection is empty")]
    EmptySelection,

    #[error("contributors already selected")]
    AlreadySelected,
}

/// Refusals of the conversation mediator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediatorError {
    /// `shutdown` has been called.
    #[error("mediator is shut down")]
    ShutDown,

    /// `start` has already been called.
    #[error("mediator already started")]
    AlreadyStarted,

    /// The collection is not configured.
    #[error("unknown collection: {0}")]
    UnknownCollection(CollectionId),

    /// The policy does not handle the requested operation.
    #[error("policy for {policy} cannot run {requested}")]
    OperationMismatch {
        policy: OperationKind,
        requested: OperationKind,
    },

    /// The policy rejected the operation parameters.
    #[error("invalid operation parameters: {0}")]
    InvalidParameters(#[from] PolicyError),

    /// The listener could not be registered.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
