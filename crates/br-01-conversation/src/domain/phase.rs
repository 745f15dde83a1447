//! Conversation phases and timer kinds.

use shared_types::MessageKind;
use std::fmt;

/// Phase of a conversation.
///
/// ```text
/// [Identifying] ──satisfied/timeout──→ [Selecting] ──selected──→ [Requesting]
///                                          │                         │
///                                          │ empty            all done/timeout
///                                          ↓                         ↓
///                                     [Terminated] ←────────── [Completing]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationPhase {
    /// Identify request broadcast, collecting identify responses.
    Identifying,
    /// Choosing contributors. Never observed from outside a transition.
    Selecting,
    /// Operation requests sent, collecting progress and final responses.
    Requesting,
    /// Merging per-contributor outcomes. Never observed from outside a transition.
    Completing,
    /// Absorbing state; the terminal event has been emitted.
    Terminated,
}

impl ConversationPhase {
    /// True once the terminal event has been emitted.
    pub fn is_terminated(self) -> bool {
        self == Self::Terminated
    }

    /// Whether an inbound message of `kind` is acceptable in this phase.
    pub fn expects(self, kind: MessageKind) -> bool {
        match self {
            Self::Identifying => kind == MessageKind::IdentifyResponse,
            Self::Requesting => matches!(
                kind,
                MessageKind::ProgressResponse | MessageKind::FinalResponse
            ),
            Self::Selecting | Self::Completing | Self::Terminated => false,
        }
    }

    /// The timer that may be live in this phase.
    pub fn timer(self) -> Option<TimerKind> {
        match self {
            Self::Identifying => Some(TimerKind::Identify),
            Self::Requesting => Some(TimerKind::Operation),
            Self::Selecting | Self::Completing | Self::Terminated => None,
        }
    }
}

impl fmt::Display for ConversationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Identifying => "identifying",
            Self::Selecting => "selecting",
            Self::Requesting => "requesting",
            Self::Completing => "completing",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// The two deadlines a conversation can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Identify,
    Operation,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identify => f.write_str("identify"),
            Self::Operation => f.write_str("operation"),
        }
    }
}
