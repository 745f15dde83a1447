//! Operation policy port.
//!
//! A policy is the per-operation-kind logic plugged into the generic
//! conversation: what to broadcast, whom to select, what to send each
//! selected contributor and how to judge the collected outcomes. Policies are
//! immutable and shared by every conversation of their kind.

use shared_types::{
    CollectionId, ComponentId, ContributorId, CorrelationId, Destination, MessageBody,
    OperationArgs, OperationKind,
};
use std::time::Duration;

use crate::domain::{
    AggregateOutcome, ContributorTracker, PolicyError, SelectionError, SelectionStrategy,
    SuccessCriterion,
};

/// Read-only facts about one conversation, handed to every policy call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationContext {
    pub correlation_id: CorrelationId,
    pub collection_id: CollectionId,
    /// Identity used as `from` on outgoing messages.
    pub client_id: ComponentId,
    /// Where contributors send their responses.
    pub reply_to: Destination,
    pub args: OperationArgs,
    /// Contributor named by the caller, if any.
    pub target: Option<ContributorId>,
    pub audit_trail_information: Option<String>,
}

/// Per-operation logic of a conversation.
///
/// Only `operation` and `selection` are required; the remaining methods have
/// defaults that fit most operations.
pub trait OperationPolicy: Send + Sync {
    /// The operation kind this policy runs.
    fn operation(&self) -> OperationKind;

    /// Check the caller's arguments before a conversation is created.
    fn validate(&self, args: &OperationArgs) -> Result<(), PolicyError> {
        if args.kind() == self.operation() {
            Ok(())
        } else {
            Err(PolicyError::ArgumentMismatch {
                expected: self.operation(),
                actual: args.kind(),
            })
        }
    }

    /// Body of the identify broadcast.
    fn build_identify_request(&self, ctx: &ConversationContext) -> Result<MessageBody, PolicyError> {
        Ok(MessageBody::IdentifyRequest {
            args: ctx.args.clone(),
        })
    }

    /// Strategy used to pick contributors.
    fn selection(&self, ctx: &ConversationContext) -> SelectionStrategy;

    /// Whether identification may end before its deadline.
    ///
    /// `elapsed` is the time since the identify request was sent.
    fn is_identification_satisfied(
        &self,
        tracker: &ContributorTracker,
        ctx: &ConversationContext,
        _elapsed: Duration,
    ) -> bool {
        self.selection(ctx).identification_satisfied(tracker)
    }

    /// Choose the contributors that receive the operation request.
    fn select_contributors(
        &self,
        tracker: &ContributorTracker,
        ctx: &ConversationContext,
    ) -> Result<Vec<ContributorId>, SelectionError> {
        self.selection(ctx).select(tracker)
    }

    /// Body of the operation request for one selected contributor.
    fn build_operation_request(
        &self,
        contributor: &ContributorId,
        ctx: &ConversationContext,
    ) -> Result<MessageBody, PolicyError> {
        Ok(MessageBody::OperationRequest {
            args: ctx.args.clone(),
            contributor: contributor.clone(),
        })
    }

    /// When the collected outcomes count as success.
    fn success_criterion(&self) -> SuccessCriterion {
        SuccessCriterion::AllSelected
    }

    /// Merge per-contributor outcomes into the final result.
    ///
    /// Called once every selected contributor is completed or failed.
    fn merge_final_result(&self, tracker: &ContributorTracker) -> Result<AggregateOutcome, PolicyError> {
        Ok(AggregateOutcome::from_tracker(tracker, self.success_criterion()))
    }
}
