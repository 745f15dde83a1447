//! Contributor Tracker - membership of contributors across phases.
//!
//! Every contributor a conversation knows of sits in exactly one category:
//!
//! ```text
//! [Outstanding] ──identify response──→ [Identified] ──select──→ [Pending]
//!       │                                                       │     │
//!   identify timeout                                   positive │     │ negative/timeout
//!       ↓                                                       ↓     ↓
//!   [Dropped]                                          [Completed]  [Failed]
//! ```

use shared_types::{ContributorId, Destination, OperationResult, ResponseInfo};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use super::errors::TrackerError;

/// A contributor's answer to the identify request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifyVerdict {
    /// The contributor can perform the operation.
    Positive,
    /// The contributor declined; it is identified but never selected.
    Negative(ResponseInfo),
}

impl IdentifyVerdict {
    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Positive)
    }
}

/// Metadata recorded for an identified contributor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    /// Private destination of the contributor (reply-to of its identify response).
    pub destination: Destination,
    pub verdict: IdentifyVerdict,
    /// Cost hint: estimated time until the contributor could deliver.
    pub time_to_deliver: Option<Duration>,
    /// Arrival order within the conversation, starting at 0.
    pub arrival: u64,
}

/// Why a selected contributor ended up failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The contributor answered with a failure code.
    Negative(ResponseInfo),
    /// The contributor was still pending when the operation deadline fired.
    Timeout,
    /// The operation request could not be handed to the transport.
    SendFailed(String),
}

impl FailureReason {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Negative(_) => "negative_response",
            Self::Timeout => "timeout",
            Self::SendFailed(_) => "send_failed",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negative(info) => f.write_str(&info.describe()),
            Self::Timeout => f.write_str("timeout"),
            Self::SendFailed(reason) => write!(f, "request could not be sent: {reason}"),
        }
    }
}

/// Result of recording a contributor response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerUpdate {
    /// State changed.
    Recorded,
    /// The contributor already has an answer for this phase; nothing changed.
    Duplicate,
    /// The contributor is not expected to answer in this phase.
    NotExpected,
}

/// Category of a contributor, see the module diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Membership {
    Outstanding,
    Identified,
    Pending,
    Completed,
    Failed,
    Dropped,
    /// Never part of this conversation.
    Unknown,
}

/// Bookkeeping of contributor membership for one conversation.
#[derive(Debug, Clone, Default)]
pub struct ContributorTracker {
    /// Contributors expected to respond. Fixed for the conversation's lifetime.
    known: BTreeSet<ContributorId>,
    /// Accept identify responses from any contributor.
    open_membership: bool,
    outstanding: BTreeSet<ContributorId>,
    identified: BTreeMap<ContributorId, Identification>,
    /// Selection order, as returned by the selection strategy.
    selected: Vec<ContributorId>,
    pending: BTreeSet<ContributorId>,
    completed: BTreeMap<ContributorId, Option<OperationResult>>,
    failed: BTreeMap<ContributorId, FailureReason>,
    dropped: BTreeSet<ContributorId>,
    /// Set once identification has ended.
    identification_closed: bool,
    next_arrival: u64,
}

impl ContributorTracker {
    /// Tracker expecting exactly the given contributors.
    pub fn with_known(known: impl IntoIterator<Item = ContributorId>) -> Self {
        let known: BTreeSet<_> = known.into_iter().collect();
        Self {
            outstanding: known.clone(),
            known,
            ..Self::default()
        }
    }

    /// Tracker accepting identify responses from any contributor.
    ///
    /// Identification can then only end by timeout (or policy decision).
    pub fn open() -> Self {
        Self {
            open_membership: true,
            ..Self::default()
        }
    }

    pub fn known(&self) -> &BTreeSet<ContributorId> {
        &self.known
    }

    pub fn is_open(&self) -> bool {
        self.open_membership
    }

    pub fn outstanding(&self) -> &BTreeSet<ContributorId> {
        &self.outstanding
    }

    pub fn identified(&self) -> &BTreeMap<ContributorId, Identification> {
        &self.identified
    }

    pub fn identification(&self, contributor: &ContributorId) -> Option<&Identification> {
        self.identified.get(contributor)
    }

    pub fn selected(&self) -> &[ContributorId] {
        &self.selected
    }

    pub fn pending(&self) -> &BTreeSet<ContributorId> {
        &self.pending
    }

    pub fn completed(&self) -> &BTreeMap<ContributorId, Option<OperationResult>> {
        &self.completed
    }

    pub fn failed(&self) -> &BTreeMap<ContributorId, FailureReason> {
        &self.failed
    }

    pub fn dropped(&self) -> &BTreeSet<ContributorId> {
        &self.dropped
    }

    /// True when every known contributor has answered the identify request.
    ///
    /// Always false with open membership.
    pub fn all_known_answered(&self) -> bool {
        !self.open_membership && self.outstanding.is_empty()
    }

    /// Contributors that identified positively, in arrival order.
    pub fn positively_identified(&self) -> Vec<(&ContributorId, &Identification)> {
        let mut positive: Vec<_> = self
            .identified
            .iter()
            .filter(|(_, identification)| identification.verdict.is_positive())
            .collect();
        positive.sort_by_key(|(_, identification)| identification.arrival);
        positive
    }

    /// Record an identify response.
    pub fn record_identification(
        &mut self,
        contributor: ContributorId,
        destination: Destination,
        verdict: IdentifyVerdict,
        time_to_deliver: Option<Duration>,
    ) -> TrackerUpdate {
        if self.identified.contains_key(&contributor) {
            return TrackerUpdate::Duplicate;
        }
        if self.identification_closed {
            return TrackerUpdate::NotExpected;
        }
        if !self.outstanding.remove(&contributor) && !self.open_membership {
            return TrackerUpdate::NotExpected;
        }

        let arrival = self.next_arrival;
        self.next_arrival += 1;
        self.identified.insert(
            contributor,
            Identification {
                destination,
                verdict,
                time_to_deliver,
                arrival,
            },
        );
        TrackerUpdate::Recorded
    }

    /// End identification: contributors still outstanding are out of consideration.
    pub fn drop_outstanding(&mut self) -> Vec<ContributorId> {
        self.identification_closed = true;
        let dropped: Vec<_> = std::mem::take(&mut self.outstanding).into_iter().collect();
        self.dropped.extend(dropped.iter().cloned());
        dropped
    }

    /// Move the chosen contributors to pending.
    ///
    /// Only positively identified contributors can be selected, each at most
    /// once, and selection happens once per conversation.
    pub fn select(&mut self, contributors: &[ContributorId]) -> Result<(), TrackerError> {
        if !self.selected.is_empty() {
            return Err(TrackerError::AlreadySelected);
        }
        if contributors.is_empty() {
            return Err(TrackerError::EmptySelection);
        }

        let mut seen = BTreeSet::new();
        for contributor in contributors {
            let eligible = self
                .identified
                .get(contributor)
                .is_some_and(|identification| identification.verdict.is_positive());
            if !eligible {
                return Err(TrackerError::NotEligible(contributor.clone()));
            }
            if !seen.insert(contributor) {
                return Err(TrackerError::SelectedTwice(contributor.clone()));
            }
        }

        // Anyone still outstanding can no longer be selected.
        self.drop_outstanding();
        self.selected = contributors.to_vec();
        self.pending = contributors.iter().cloned().collect();
        Ok(())
    }

    pub fn is_pending(&self, contributor: &ContributorId) -> bool {
        self.pending.contains(contributor)
    }

    /// Record a successful final response.
    pub fn record_completion(
        &mut self,
        contributor: &ContributorId,
        result: Option<OperationResult>,
    ) -> TrackerUpdate {
        if self.pending.remove(contributor) {
            self.completed.insert(contributor.clone(), result);
            TrackerUpdate::Recorded
        } else if self.is_finished(contributor) {
            TrackerUpdate::Duplicate
        } else {
            TrackerUpdate::NotExpected
        }
    }

    /// Record a failed final response (or a local failure such as a send error).
    pub fn record_failure(
        &mut self,
        contributor: &ContributorId,
        reason: FailureReason,
    ) -> TrackerUpdate {
        if self.pending.remove(contributor) {
            self.failed.insert(contributor.clone(), reason);
            TrackerUpdate::Recorded
        } else if self.is_finished(contributor) {
            TrackerUpdate::Duplicate
        } else {
            TrackerUpdate::NotExpected
        }
    }

    /// Fail every pending contributor with the same reason, in selection order.
    pub fn fail_pending(&mut self, reason: &FailureReason) -> Vec<ContributorId> {
        let pending: Vec<_> = self
            .selected
            .iter()
            .filter(|contributor| self.pending.contains(*contributor))
            .cloned()
            .collect();
        for contributor in &pending {
            self.pending.remove(contributor);
            self.failed.insert(contributor.clone(), reason.clone());
        }
        pending
    }

    /// True once selection happened and no selected contributor is pending.
    pub fn all_selected_finished(&self) -> bool {
        !self.selected.is_empty() && self.pending.is_empty()
    }

    fn is_finished(&self, contributor: &ContributorId) -> bool {
        self.completed.contains_key(contributor) || self.failed.contains_key(contributor)
    }

    /// Current category of a contributor.
    pub fn membership(&self, contributor: &ContributorId) -> Membership {
        if self.pending.contains(contributor) {
            Membership::Pending
        } else if self.completed.contains_key(contributor) {
            Membership::Completed
        } else if self.failed.contains_key(contributor) {
            Membership::Failed
        } else if self.identified.contains_key(contributor) {
            Membership::Identified
        } else if self.outstanding.contains(contributor) {
            Membership::Outstanding
        } else if self.dropped.contains(contributor) {
            Membership::Dropped
        } else {
            Membership::Unknown
        }
    }

    /// Check the membership invariants.
    ///
    /// - every contributor is in exactly one category
    /// - `selected = completed ∪ failed ∪ pending`
    /// - every known contributor is accounted for
    pub fn is_consistent(&self) -> bool {
        let mut seen: BTreeSet<&ContributorId> = BTreeSet::new();
        let not_selected = self
            .identified
            .keys()
            .filter(|id| !self.selected.contains(id));
        let categories = self
            .outstanding
            .iter()
            .chain(not_selected)
            .chain(self.pending.iter())
            .chain(self.completed.keys())
            .chain(self.failed.keys())
            .chain(self.dropped.iter());
        for contributor in categories {
            if !seen.insert(contributor) {
                return false;
            }
        }

        let finished_or_pending = self.pending.len() + self.completed.len() + self.failed.len();
        if finished_or_pending != self.selected.len() {
            return false;
        }
        if self.selected.iter().any(|id| !self.identified.contains_key(id)) {
            return false;
        }
        self.known.iter().all(|id| seen.contains(id))
    }
}
