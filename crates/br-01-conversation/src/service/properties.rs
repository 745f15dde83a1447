//! Randomized message/timer interleavings against one conversation.

use proptest::prelude::*;
use shared_types::{
    CollectionId, ComponentId, ContributorId, CorrelationId, Destination, Message, OperationArgs,
    OperationKind, ResponseCode,
};
use std::sync::Arc;
use std::time::Duration;

use super::conversation::{Conversation, ConversationSetup, HandleOutcome, IgnoreReason, Participants};
use crate::adapters::ManualScheduler;
use crate::config::ConversationTimeouts;
use crate::domain::{EventPayload, OperationEventType, SelectionStrategy, TerminalReason};
use crate::ports::ConversationContext;
use crate::testing::{final_reply, identify_reply, progress_reply, RecordingEventSink, RecordingTransport, StaticPolicy};

const IDENTIFY: Duration = Duration::from_secs(10);
const OPERATION: Duration = Duration::from_secs(60);
const NAMES: [&str; 3] = ["a", "b", "c"];

#[derive(Debug, Clone)]
enum Step {
    Identify { who: usize, positive: bool, ttd: Option<u64> },
    Progress { who: usize },
    Final { who: usize, success: bool },
    Foreign { who: usize },
    Advance { millis: u64 },
    Fail,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0..NAMES.len(), any::<bool>(), proptest::option::of(0u64..5_000))
            .prop_map(|(who, positive, ttd)| Step::Identify { who, positive, ttd }),
        1 => (0..NAMES.len()).prop_map(|who| Step::Progress { who }),
        4 => (0..NAMES.len(), any::<bool>()).prop_map(|(who, success)| Step::Final { who, success }),
        1 => (0..NAMES.len()).prop_map(|who| Step::Foreign { who }),
        2 => (0u64..70_000).prop_map(|millis| Step::Advance { millis }),
        1 => Just(Step::Fail),
    ]
}

fn strategy_strategy() -> impl Strategy<Value = SelectionStrategy> {
    prop_oneof![
        Just(SelectionStrategy::AllIdentified),
        (1usize..3).prop_map(|count| SelectionStrategy::FastestFirst { count }),
        Just(SelectionStrategy::SpecificTarget(ContributorId::new("b"))),
    ]
}

struct Run {
    conversation: Arc<Conversation>,
    transport: Arc<RecordingTransport>,
    scheduler: Arc<ManualScheduler>,
    sink: Arc<RecordingEventSink>,
}

impl Run {
    fn new(strategy: SelectionStrategy) -> Self {
        let transport = Arc::new(RecordingTransport::new());
        let scheduler = Arc::new(ManualScheduler::new());
        let sink = Arc::new(RecordingEventSink::new());
        let conversation = Conversation::new(ConversationSetup {
            context: ConversationContext {
                correlation_id: CorrelationId::new(),
                collection_id: CollectionId::new("books"),
                client_id: ComponentId::new("client"),
                reply_to: Destination::new("client.receiver"),
                args: OperationArgs::GetStatus,
                target: None,
                audit_trail_information: None,
            },
            policy: Arc::new(StaticPolicy::new(OperationKind::GetStatus, strategy)),
            transport: transport.clone(),
            scheduler: scheduler.clone(),
            sink: sink.clone(),
            broadcast: Destination::new("collection.books"),
            timeouts: ConversationTimeouts {
                identify: IDENTIFY,
                operation: OPERATION,
            },
            participants: Participants::Known(NAMES.iter().map(|n| ContributorId::new(*n)).collect()),
            on_terminated: None,
        });
        conversation.start();
        Self {
            conversation,
            transport,
            scheduler,
            sink,
        }
    }

    fn request(&self) -> Message {
        self.transport.sent()[0].1.clone()
    }

    fn apply(&self, step: &Step) {
        let request = self.request();
        match step {
            Step::Identify { who, positive, ttd } => {
                let code = if *positive {
                    ResponseCode::IdentificationPositive
                } else {
                    ResponseCode::IdentificationNegative
                };
                self.conversation.handle(identify_reply(
                    &request,
                    NAMES[*who],
                    code,
                    ttd.map(Duration::from_millis),
                ));
            }
            Step::Progress { who } => {
                self.conversation
                    .handle(progress_reply(&request, NAMES[*who], ResponseCode::OperationProgress));
            }
            Step::Final { who, success } => {
                let code = if *success {
                    ResponseCode::OperationCompleted
                } else {
                    ResponseCode::Failure
                };
                self.conversation
                    .handle(final_reply(&request, NAMES[*who], code, None));
            }
            Step::Foreign { who } => {
                let mut message =
                    identify_reply(&request, NAMES[*who], ResponseCode::IdentificationPositive, None);
                message.collection_id = CollectionId::new("films");
                self.conversation.handle(message);
            }
            Step::Advance { millis } => {
                self.scheduler.advance(Duration::from_millis(*millis));
            }
            Step::Fail => {
                self.conversation.fail(TerminalReason::MediatorShutDown);
            }
        }
    }

    /// Let every pending deadline pass.
    fn drain(&self) {
        self.scheduler.advance(IDENTIFY + OPERATION);
    }

    /// Events without timestamps and correlation ids, for comparison across runs.
    fn trace(&self) -> Vec<(OperationEventType, Option<ContributorId>, EventPayload)> {
        self.sink
            .events()
            .into_iter()
            .map(|e| (e.event_type, e.contributor, e.payload))
            .collect()
    }
}

fn position(types: &[OperationEventType], wanted: OperationEventType) -> Option<usize> {
    types.iter().position(|t| *t == wanted)
}

proptest! {
    #[test]
    fn prop_exactly_one_terminal_event_last(
        strategy in strategy_strategy(),
        steps in prop::collection::vec(step_strategy(), 0..30),
    ) {
        let run = Run::new(strategy);
        for step in &steps {
            run.apply(step);
        }
        run.drain();

        let types = run.sink.event_types();
        prop_assert_eq!(run.sink.terminal_count(), 1);
        prop_assert!(types.last().is_some_and(|t| t.is_terminal()));
        prop_assert_eq!(types.first(), Some(&OperationEventType::IdentifyRequestSent));
        prop_assert!(run.conversation.snapshot().tracker.is_consistent());

        // Identification events precede IdentificationComplete.
        if let Some(complete) = position(&types, OperationEventType::IdentificationComplete) {
            prop_assert!(types[complete..]
                .iter()
                .all(|t| *t != OperationEventType::ComponentIdentified));
        }
        // RequestSent precedes every per-request event.
        let first_request_event = types.iter().position(|t| {
            matches!(
                t,
                OperationEventType::Progress
                    | OperationEventType::ComponentComplete
                    | OperationEventType::ComponentFailed
            )
        });
        if let Some(first) = first_request_event {
            let sent = position(&types, OperationEventType::RequestSent);
            prop_assert!(sent.is_some_and(|sent| sent < first));
        }
    }

    #[test]
    fn prop_duplicate_final_responses_are_idempotent(
        strategy in strategy_strategy(),
        steps in prop::collection::vec(step_strategy(), 0..30),
    ) {
        let once = Run::new(strategy.clone());
        let twice = Run::new(strategy);
        for step in &steps {
            once.apply(step);
            twice.apply(step);
            if matches!(step, Step::Final { .. }) {
                twice.apply(step);
            }
        }
        once.drain();
        twice.drain();

        prop_assert_eq!(once.trace(), twice.trace());
        let a = once.conversation.snapshot().tracker;
        let b = twice.conversation.snapshot().tracker;
        prop_assert_eq!(a.completed(), b.completed());
        prop_assert_eq!(a.failed(), b.failed());
    }

    #[test]
    fn prop_late_messages_never_reemit(
        strategy in strategy_strategy(),
        steps in prop::collection::vec(step_strategy(), 0..30),
        late in prop::collection::vec(step_strategy(), 1..10),
    ) {
        let run = Run::new(strategy);
        for step in &steps {
            run.apply(step);
        }
        run.drain();
        let before = run.trace();

        let request = run.request();
        for step in &late {
            run.apply(step);
        }
        for name in NAMES {
            let outcome = run.conversation.handle(final_reply(
                &request,
                name,
                ResponseCode::OperationCompleted,
                None,
            ));
            prop_assert_eq!(outcome, HandleOutcome::Ignored(IgnoreReason::Terminated));
        }
        prop_assert_eq!(run.trace(), before);
    }
}
