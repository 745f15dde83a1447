//! Contributor selection strategies.
//!
//! | Strategy | Selected set |
//! |----------|--------------|
//! | `AllIdentified` | every positively identified contributor |
//! | `SpecificTarget` | the named contributor, if it identified positively |
//! | `FastestFirst` | the `count` best by time-to-deliver, ties by arrival |

use shared_types::ContributorId;
use std::time::Duration;

use super::errors::SelectionError;
use super::tracker::ContributorTracker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionStrategy {
    AllIdentified,
    SpecificTarget(ContributorId),
    FastestFirst { count: usize },
}

impl SelectionStrategy {
    /// Choose contributors from the tracker's identifications.
    ///
    /// Never returns an empty list.
    pub fn select(&self, tracker: &ContributorTracker) -> Result<Vec<ContributorId>, SelectionError> {
        let positive = tracker.positively_identified();

        let selected: Vec<ContributorId> = match self {
            Self::AllIdentified => positive.into_iter().map(|(id, _)| id.clone()).collect(),
            Self::SpecificTarget(target) => {
                if positive.iter().any(|(id, _)| *id == target) {
                    vec![target.clone()]
                } else {
                    return Err(SelectionError::RequestedContributorNotAvailable(
                        target.clone(),
                    ));
                }
            }
            Self::FastestFirst { count } => {
                let mut ranked = positive;
                // Contributors without a hint rank after every contributor with one.
                ranked.sort_by_key(|(_, identification)| {
                    (
                        identification.time_to_deliver.is_none(),
                        identification.time_to_deliver.unwrap_or(Duration::ZERO),
                        identification.arrival,
                    )
                });
                ranked
                    .into_iter()
                    .take((*count).max(1))
                    .map(|(id, _)| id.clone())
                    .collect()
            }
        };

        if selected.is_empty() {
            Err(SelectionError::NoContributorAvailable)
        } else {
            Ok(selected)
        }
    }

    /// Whether identification can end before its deadline.
    ///
    /// A specific target may stop waiting as soon as the target has answered;
    /// otherwise every known contributor must have answered. Open membership
    /// always waits for the deadline.
    pub fn identification_satisfied(&self, tracker: &ContributorTracker) -> bool {
        if let Self::SpecificTarget(target) = self {
            if tracker.identification(target).is_some() {
                return true;
            }
        }
        tracker.all_known_answered()
    }
}
