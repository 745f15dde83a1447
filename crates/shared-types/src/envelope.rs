//! # `Message` Envelope
//!
//! The universal wrapper for everything sent over the message bus.
//!
//! ## Properties
//!
//! - **Versioning**: All messages include a `version` field for forward compatibility.
//! - **Correlation**: Request/response flows share `correlation_id`; responses go to `reply_to`.
//! - **Collection Scoping**: `collection_id` separates traffic of different collections
//!   sharing one bus.
//! - **Envelope Authority**: `from` is the sole source of truth for the sender's identity.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::time::Duration;

use crate::ids::{CollectionId, ComponentId, ContributorId, CorrelationId, Destination};
use crate::operations::{OperationArgs, OperationKind, OperationResult};
use crate::response::ResponseInfo;
use crate::PROTOCOL_VERSION;

/// Discriminant of a message body, used for phase validation and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    IdentifyRequest,
    IdentifyResponse,
    OperationRequest,
    ProgressResponse,
    FinalResponse,
}

impl MessageKind {
    /// True for the kinds sent by contributors.
    #[must_use]
    pub fn is_response(self) -> bool {
        matches!(
            self,
            Self::IdentifyResponse | Self::ProgressResponse | Self::FinalResponse
        )
    }
}

/// Tagged union over the whole message catalogue.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    /// Broadcast asking which contributors can perform the operation.
    IdentifyRequest { args: OperationArgs },

    /// A contributor's answer to an identify request.
    IdentifyResponse {
        operation: OperationKind,
        info: ResponseInfo,
        /// Estimated time until the contributor could deliver (cost hint).
        #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
        time_to_deliver: Option<Duration>,
    },

    /// The real operation request, addressed to one selected contributor.
    OperationRequest {
        args: OperationArgs,
        contributor: ContributorId,
    },

    /// Intermediate progress reported by a contributor.
    ProgressResponse {
        operation: OperationKind,
        info: ResponseInfo,
    },

    /// The contributor's final outcome.
    FinalResponse {
        operation: OperationKind,
        info: ResponseInfo,
        result: Option<OperationResult>,
    },
}

impl MessageBody {
    /// The kind of this body.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::IdentifyRequest { .. } => MessageKind::IdentifyRequest,
            Self::IdentifyResponse { .. } => MessageKind::IdentifyResponse,
            Self::OperationRequest { .. } => MessageKind::OperationRequest,
            Self::ProgressResponse { .. } => MessageKind::ProgressResponse,
            Self::FinalResponse { .. } => MessageKind::FinalResponse,
        }
    }

    /// The operation this body belongs to.
    #[must_use]
    pub fn operation(&self) -> OperationKind {
        match self {
            Self::IdentifyRequest { args } | Self::OperationRequest { args, .. } => args.kind(),
            Self::IdentifyResponse { operation, .. }
            | Self::ProgressResponse { operation, .. }
            | Self::FinalResponse { operation, .. } => *operation,
        }
    }

    /// Response info for response kinds.
    #[must_use]
    pub fn response_info(&self) -> Option<&ResponseInfo> {
        match self {
            Self::IdentifyResponse { info, .. }
            | Self::ProgressResponse { info, .. }
            | Self::FinalResponse { info, .. } => Some(info),
            Self::IdentifyRequest { .. } | Self::OperationRequest { .. } => None,
        }
    }
}

/// The message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    // =========================================================================
    // HEADER SECTION
    // =========================================================================
    /// Protocol version of the sender.
    pub version: u16,

    /// Conversation this message belongs to. For requests: the conversation's
    /// id. For responses: copied from the request.
    pub correlation_id: CorrelationId,

    /// Collection the message concerns.
    pub collection_id: CollectionId,

    /// Sender identity.
    pub from: ComponentId,

    /// Intended recipient, absent for broadcasts.
    pub to: Option<ComponentId>,

    /// Where responses to this message must be sent.
    pub reply_to: Destination,

    /// Free text recorded by contributors in their audit trails.
    pub audit_trail_information: Option<String>,

    // =========================================================================
    // PAYLOAD SECTION
    // =========================================================================
    pub body: MessageBody,
}

impl Message {
    /// Build a message stamped with the current protocol version.
    pub fn new(
        correlation_id: CorrelationId,
        collection_id: CollectionId,
        from: ComponentId,
        reply_to: Destination,
        body: MessageBody,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            correlation_id,
            collection_id,
            from,
            to: None,
            reply_to,
            audit_trail_information: None,
            body,
        }
    }

    /// Address the message to a single component.
    #[must_use]
    pub fn to(mut self, recipient: ComponentId) -> Self {
        self.to = Some(recipient);
        self
    }

    /// Attach audit trail information.
    #[must_use]
    pub fn with_audit_trail_information(mut self, info: Option<String>) -> Self {
        self.audit_trail_information = info;
        self
    }

    /// Shorthand for `self.body.kind()`.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Build a response to this message, preserving correlation and collection.
    pub fn reply(&self, from: ComponentId, reply_to: Destination, body: MessageBody) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            correlation_id: self.correlation_id,
            collection_id: self.collection_id.clone(),
            from,
            to: Some(self.from.clone()),
            reply_to,
            audit_trail_information: None,
            body,
        }
    }
}
