//! Operation events - the ordered lifecycle stream of one conversation.
//!
//! ## Ordering
//!
//! Within one conversation:
//! 1. `IdentifyRequestSent` first
//! 2. `ComponentIdentified`* before `IdentificationComplete`
//! 3. `RequestSent` before any `Progress`/`ComponentComplete`/`ComponentFailed`
//! 4. exactly one of `Complete`/`Failed`, always last

use chrono::{DateTime, Utc};
use shared_types::{CollectionId, ContributorId, CorrelationId, OperationKind, OperationResult, ResponseInfo};
use std::fmt;
use std::time::Duration;

use super::outcome::AggregateOutcome;
use super::tracker::{FailureReason, IdentifyVerdict};

/// Event types, in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationEventType {
    IdentifyRequestSent,
    ComponentIdentified,
    IdentificationComplete,
    RequestSent,
    Progress,
    ComponentComplete,
    ComponentFailed,
    Complete,
    Failed,
}

impl OperationEventType {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for OperationEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Data attached to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    None,
    /// `ComponentIdentified`
    Identification {
        verdict: IdentifyVerdict,
        time_to_deliver: Option<Duration>,
    },
    /// `IdentificationComplete` (selected) and `RequestSent` (requested).
    Contributors(Vec<ContributorId>),
    /// `Progress`
    Progress(ResponseInfo),
    /// `ComponentComplete`
    Result(Option<OperationResult>),
    /// `ComponentFailed`
    Failure(FailureReason),
    /// `Complete` / `Failed`
    Outcome(AggregateOutcome),
}

/// One lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationEvent {
    pub correlation_id: CorrelationId,
    pub collection_id: CollectionId,
    pub operation: OperationKind,
    pub event_type: OperationEventType,
    /// Absent for whole-conversation events.
    pub contributor: Option<ContributorId>,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
}

impl OperationEvent {
    pub fn is_terminal(&self) -> bool {
        self.event_type.is_terminal()
    }

    /// The aggregate outcome, for terminal events.
    pub fn outcome(&self) -> Option<&AggregateOutcome> {
        match &self.payload {
            EventPayload::Outcome(outcome) => Some(outcome),
            _ => None,
        }
    }
}

impl fmt::Display for OperationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.correlation_id.short(), self.operation, self.event_type)?;
        if let Some(contributor) = &self.contributor {
            write!(f, " from {contributor}")?;
        }
        match &self.payload {
            EventPayload::Failure(reason) => write!(f, ": {reason}"),
            EventPayload::Outcome(outcome) => write!(f, ": {}", outcome.describe()),
            EventPayload::Progress(info) => write!(f, ": {}", info.describe()),
            _ => Ok(()),
        }
    }
}
