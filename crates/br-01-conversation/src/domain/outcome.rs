//! Aggregate outcomes and success criteria.

use shared_types::{ContributorId, OperationResult};
use std::collections::BTreeMap;
use std::fmt;

use super::errors::SelectionError;
use super::tracker::{ContributorTracker, FailureReason};

/// When the collected per-contributor outcomes count as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessCriterion {
    /// Every selected contributor completed.
    AllSelected,
    /// At least `n` contributors completed (`n` is at least 1).
    AtLeast(usize),
}

impl SuccessCriterion {
    pub fn is_met(self, completed: usize, selected: usize) -> bool {
        match self {
            Self::AllSelected => selected > 0 && completed == selected,
            Self::AtLeast(n) => completed >= n.max(1),
        }
    }
}

impl fmt::Display for SuccessCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllSelected => f.write_str("all selected"),
            Self::AtLeast(n) => write!(f, "at least {}", (*n).max(1)),
        }
    }
}

/// Why a conversation ended `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalReason {
    NoContributorAvailable,
    RequestedContributorNotAvailable(ContributorId),
    /// The identify broadcast could not be handed to the transport.
    IdentifyRequestNotSent(String),
    /// The collected outcomes do not satisfy the operation's criterion.
    CriterionNotMet {
        criterion: SuccessCriterion,
        completed: usize,
        selected: usize,
    },
    /// The conversation outlived the configured maximum age.
    ConversationTimedOut,
    /// The mediator was shut down while the conversation was active.
    MediatorShutDown,
    /// Policy code failed or broke its contract.
    Defect(String),
}

impl TerminalReason {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoContributorAvailable => "no_contributor",
            Self::RequestedContributorNotAvailable(_) => "requested_contributor_unavailable",
            Self::IdentifyRequestNotSent(_) => "identify_not_sent",
            Self::CriterionNotMet { .. } => "criterion_not_met",
            Self::ConversationTimedOut => "conversation_timeout",
            Self::MediatorShutDown => "shutdown",
            Self::Defect(_) => "defect",
        }
    }
}

impl From<SelectionError> for TerminalReason {
    fn from(err: SelectionError) -> Self {
        match err {
            SelectionError::NoContributorAvailable => Self::NoContributorAvailable,
            SelectionError::RequestedContributorNotAvailable(id) => {
                Self::RequestedContributorNotAvailable(id)
            }
        }
    }
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoContributorAvailable => f.write_str("no contributor available"),
            Self::RequestedContributorNotAvailable(id) => {
                write!(f, "requested contributor not available: {id}")
            }
            Self::IdentifyRequestNotSent(reason) => {
                write!(f, "identify request could not be sent: {reason}")
            }
            Self::CriterionNotMet {
                criterion,
                completed,
                selected,
            } => write!(
                f,
                "{completed} of {selected} contributors completed, {criterion} required"
            ),
            Self::ConversationTimedOut => f.write_str("conversation timed out"),
            Self::MediatorShutDown => f.write_str("mediator shut down"),
            Self::Defect(detail) => write!(f, "conversation defect: {detail}"),
        }
    }
}

/// Final outcome of a conversation, carried by its terminal event.
///
/// Per-contributor results are kept on failure too, for partial delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOutcome {
    /// `None` on success.
    pub reason: Option<TerminalReason>,
    pub results: BTreeMap<ContributorId, Option<OperationResult>>,
    pub failures: BTreeMap<ContributorId, FailureReason>,
}

impl AggregateOutcome {
    pub fn success(
        results: BTreeMap<ContributorId, Option<OperationResult>>,
        failures: BTreeMap<ContributorId, FailureReason>,
    ) -> Self {
        Self {
            reason: None,
            results,
            failures,
        }
    }

    /// Failure keeping whatever the tracker has collected so far.
    pub fn failure(reason: TerminalReason, tracker: &ContributorTracker) -> Self {
        Self {
            reason: Some(reason),
            results: tracker.completed().clone(),
            failures: tracker.failed().clone(),
        }
    }

    /// Judge the tracker against a success criterion.
    pub fn from_tracker(tracker: &ContributorTracker, criterion: SuccessCriterion) -> Self {
        let completed = tracker.completed().len();
        let selected = tracker.selected().len();
        if criterion.is_met(completed, selected) {
            Self::success(tracker.completed().clone(), tracker.failed().clone())
        } else {
            Self::failure(
                TerminalReason::CriterionNotMet {
                    criterion,
                    completed,
                    selected,
                },
                tracker,
            )
        }
    }

    pub fn is_success(&self) -> bool {
        self.reason.is_none()
    }

    /// Results that carry a payload, in contributor order.
    pub fn payloads(&self) -> impl Iterator<Item = (&ContributorId, &OperationResult)> {
        self.results
            .iter()
            .filter_map(|(id, result)| result.as_ref().map(|result| (id, result)))
    }

    /// Human-readable summary: the reason plus every failed contributor.
    pub fn describe(&self) -> String {
        let mut text = match &self.reason {
            Some(reason) => reason.to_string(),
            None => format!("{} contributors completed", self.results.len()),
        };
        if !self.failures.is_empty() {
            let failed: Vec<_> = self
                .failures
                .iter()
                .map(|(id, reason)| format!("{id}: {reason}"))
                .collect();
            text.push_str(" [failed: ");
            text.push_str(&failed.join("; "));
            text.push(']');
        }
        text
    }
}
