//! Conversation - one in-flight distributed operation.
//!
//! ## Serialization
//!
//! Every entry point (`start`, `handle`, timer callbacks, `fail`) takes the
//! per-conversation lock for the whole transition, so message delivery and
//! timer firing for the same conversation are linearized. Different
//! conversations never share this lock.
//!
//! ## Termination
//!
//! `Terminated` is absorbing: exactly one `Complete`/`Failed` event is emitted,
//! timers are cancelled, and the termination hook runs once, after the lock
//! is released.

use br_telemetry::{log_contributor, log_conversation, CONTRIBUTOR_FAILURES};
use chrono::Utc;
use parking_lot::Mutex;
use shared_bus::MessageTransport;
use shared_types::{
    CollectionId, ContributorId, CorrelationId, Destination, Message, MessageBody, MessageKind,
    OperationKind, OperationResult, ResponseInfo,
};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::config::ConversationTimeouts;
use crate::domain::{
    AggregateOutcome, ContributorTracker, ConversationPhase, EventPayload, FailureReason,
    IdentifyVerdict, OperationEvent, OperationEventType, TerminalReason, TimerKind, TrackerUpdate,
};
use crate::ports::{ConversationContext, EventSink, OperationPolicy, Scheduler, TimerHandle};

/// Runs once when the conversation terminates, with its outcome and age.
pub type TerminationHook = Box<dyn FnOnce(&AggregateOutcome, Duration) + Send>;

/// Who may take part in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Participants {
    /// A fixed set; identification may end once all of them answered.
    Known(Vec<ContributorId>),
    /// Whoever answers before the identify deadline.
    AllResponders,
}

/// Everything a conversation needs, assembled by the mediator.
pub struct ConversationSetup {
    pub context: ConversationContext,
    pub policy: Arc<dyn OperationPolicy>,
    pub transport: Arc<dyn MessageTransport>,
    pub scheduler: Arc<dyn Scheduler>,
    pub sink: Arc<dyn EventSink>,
    /// Broadcast destination of the identify request.
    pub broadcast: Destination,
    pub timeouts: ConversationTimeouts,
    pub participants: Participants,
    pub on_terminated: Option<TerminationHook>,
}

/// Result of offering a message to a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The message changed the conversation's state.
    Applied,
    /// The message was discarded.
    Ignored(IgnoreReason),
}

/// Why an inbound message was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Correlation id belongs to another conversation.
    WrongCorrelation,
    /// Traffic of another collection.
    ForeignCollection,
    /// The conversation already terminated.
    Terminated,
    /// Message kind not accepted in the current phase.
    UnexpectedKind {
        kind: MessageKind,
        phase: ConversationPhase,
    },
    /// Response for a different operation kind.
    OperationMismatch,
    /// Sender is not a participant the phase waits for.
    NotExpected,
    /// Repeated identify or final response.
    Duplicate,
    /// Final response carrying a progress code.
    Malformed,
}

impl IgnoreReason {
    /// Label for the discarded-messages metric.
    pub fn label(self) -> &'static str {
        match self {
            Self::WrongCorrelation => "wrong_correlation",
            Self::ForeignCollection => "foreign_collection",
            Self::Terminated => "terminated",
            Self::UnexpectedKind { .. } => "unexpected_kind",
            Self::OperationMismatch => "operation_mismatch",
            Self::NotExpected => "not_expected",
            Self::Duplicate => "duplicate",
            Self::Malformed => "malformed",
        }
    }
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedKind { kind, phase } => {
                write!(f, "{kind:?} not expected while {phase}")
            }
            other => f.write_str(other.label()),
        }
    }
}

/// Point-in-time view of a conversation, for diagnostics.
#[derive(Debug, Clone)]
pub struct ConversationSnapshot {
    pub correlation_id: CorrelationId,
    pub collection_id: CollectionId,
    pub operation: OperationKind,
    pub phase: ConversationPhase,
    pub tracker: ContributorTracker,
    /// Set once terminated.
    pub outcome: Option<AggregateOutcome>,
    pub age: Duration,
}

struct ConversationState {
    phase: ConversationPhase,
    started: bool,
    tracker: ContributorTracker,
    identify_timer: Option<TimerHandle>,
    operation_timer: Option<TimerHandle>,
    /// When the identify request went out.
    identify_sent_at: Option<Instant>,
    outcome: Option<AggregateOutcome>,
    on_terminated: Option<TerminationHook>,
}

impl ConversationState {
    fn cancel_timers(&mut self) {
        if let Some(mut timer) = self.identify_timer.take() {
            timer.cancel();
        }
        if let Some(mut timer) = self.operation_timer.take() {
            timer.cancel();
        }
    }
}

/// One distributed operation: identify, select, request, aggregate.
pub struct Conversation {
    context: ConversationContext,
    policy: Arc<dyn OperationPolicy>,
    transport: Arc<dyn MessageTransport>,
    scheduler: Arc<dyn Scheduler>,
    sink: Arc<dyn EventSink>,
    broadcast: Destination,
    timeouts: ConversationTimeouts,
    created: Instant,
    this: Weak<Conversation>,
    state: Mutex<ConversationState>,
}

impl Conversation {
    /// Create a conversation. Nothing is sent until [`Conversation::start`].
    pub fn new(setup: ConversationSetup) -> Arc<Self> {
        let tracker = match setup.participants {
            Participants::Known(known) => ContributorTracker::with_known(known),
            Participants::AllResponders => ContributorTracker::open(),
        };
        let created = setup.scheduler.now();

        Arc::new_cyclic(|this| Self {
            context: setup.context,
            policy: setup.policy,
            transport: setup.transport,
            scheduler: setup.scheduler,
            sink: setup.sink,
            broadcast: setup.broadcast,
            timeouts: setup.timeouts,
            created,
            this: this.clone(),
            state: Mutex::new(ConversationState {
                phase: ConversationPhase::Identifying,
                started: false,
                tracker,
                identify_timer: None,
                operation_timer: None,
                identify_sent_at: None,
                outcome: None,
                on_terminated: setup.on_terminated,
            }),
        })
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.context.correlation_id
    }

    pub fn collection_id(&self) -> &CollectionId {
        &self.context.collection_id
    }

    pub fn operation(&self) -> OperationKind {
        self.policy.operation()
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn phase(&self) -> ConversationPhase {
        self.state.lock().phase
    }

    pub fn is_terminated(&self) -> bool {
        self.phase().is_terminated()
    }

    /// Time since creation on the scheduler's clock.
    pub fn age(&self) -> Duration {
        self.scheduler.now().saturating_duration_since(self.created)
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        let state = self.state.lock();
        ConversationSnapshot {
            correlation_id: self.correlation_id(),
            collection_id: self.context.collection_id.clone(),
            operation: self.operation(),
            phase: state.phase,
            tracker: state.tracker.clone(),
            outcome: state.outcome.clone(),
            age: self.age(),
        }
    }

    /// Broadcast the identify request and arm the identify timer.
    ///
    /// Only the first call has an effect.
    pub fn start(&self) {
        self.transition(|state| {
            if state.started || state.phase.is_terminated() {
                return;
            }
            state.started = true;
            self.send_identify_request(state);
        });
    }

    /// Offer an inbound message to this conversation.
    pub fn handle(&self, message: Message) -> HandleOutcome {
        if message.correlation_id != self.correlation_id() {
            return HandleOutcome::Ignored(IgnoreReason::WrongCorrelation);
        }
        if message.collection_id != self.context.collection_id {
            log_conversation!(
                debug,
                self.correlation_id(),
                "Discarding message of foreign collection",
                collection = %message.collection_id
            );
            return HandleOutcome::Ignored(IgnoreReason::ForeignCollection);
        }

        let outcome = self.transition(|state| self.apply(state, message));
        if let HandleOutcome::Ignored(reason) = outcome {
            log_conversation!(debug, self.correlation_id(), "Discarding message", reason = %reason);
        }
        outcome
    }

    /// End the conversation `Failed` from outside, e.g. on shutdown.
    ///
    /// Returns false if it had already terminated.
    pub fn fail(&self, reason: TerminalReason) -> bool {
        self.transition(|state| {
            if state.phase.is_terminated() {
                return false;
            }
            let outcome = AggregateOutcome::failure(reason, &state.tracker);
            self.terminate(state, outcome);
            true
        })
    }

    /// Run a transition under the lock, then the termination hook without it.
    fn transition<R>(&self, f: impl FnOnce(&mut ConversationState) -> R) -> R {
        let mut state = self.state.lock();
        let result = f(&mut state);
        let finished = if state.phase.is_terminated() {
            state
                .on_terminated
                .take()
                .zip(state.outcome.clone())
        } else {
            None
        };
        drop(state);

        if let Some((hook, outcome)) = finished {
            hook(&outcome, self.age());
        }
        result
    }

    fn on_timer(&self, kind: TimerKind) {
        self.transition(|state| {
            // Lost the race against a phase change or termination.
            if state.phase.timer() != Some(kind) {
                let phase = state.phase;
                log_conversation!(debug, self.correlation_id(), "Ignoring stale timer", timer = %kind, phase = %phase);
                return;
            }
            match kind {
                TimerKind::Identify => {
                    state.identify_timer = None;
                    let dropped = state.tracker.drop_outstanding();
                    for contributor in &dropped {
                        log_contributor!(
                            warn,
                            self.correlation_id(),
                            contributor,
                            "No identify response before deadline"
                        );
                    }
                    self.finish_identification(state);
                }
                TimerKind::Operation => {
                    state.operation_timer = None;
                    let reason = FailureReason::Timeout;
                    let timed_out = state.tracker.fail_pending(&reason);
                    for contributor in timed_out {
                        self.contributor_failed(contributor, reason.clone());
                    }
                    self.complete(state);
                }
            }
        });
    }

    fn schedule_timer(&self, kind: TimerKind, delay: Duration) -> TimerHandle {
        let conversation = self.this.clone();
        self.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(conversation) = conversation.upgrade() {
                    conversation.on_timer(kind);
                }
            }),
        )
    }

    fn message(&self, body: MessageBody) -> Message {
        Message::new(
            self.context.correlation_id,
            self.context.collection_id.clone(),
            self.context.client_id.clone(),
            self.context.reply_to.clone(),
            body,
        )
        .with_audit_trail_information(self.context.audit_trail_information.clone())
    }

    // =========================================================================
    // Identifying
    // =========================================================================

    fn send_identify_request(&self, state: &mut ConversationState) {
        let body = match guarded(|| self.policy.build_identify_request(&self.context)) {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                return self.defect(state, format!("identify request rejected: {e}"));
            }
            Err(panic) => {
                return self.defect(state, format!("building identify request panicked: {panic}"));
            }
        };

        let mut request = self.message(body);
        if let Some(target) = &self.context.target {
            request = request.to(target.clone());
        }
        if let Err(e) = self.transport.send(&self.broadcast, request) {
            log_conversation!(warn, self.correlation_id(), "Identify request could not be sent", error = %e);
            let outcome = AggregateOutcome::failure(
                TerminalReason::IdentifyRequestNotSent(e.to_string()),
                &state.tracker,
            );
            return self.terminate(state, outcome);
        }

        state.identify_sent_at = Some(self.scheduler.now());
        log_conversation!(
            info,
            self.correlation_id(),
            "Identify request sent",
            operation = %self.operation(),
            collection = %self.context.collection_id
        );
        self.emit(OperationEventType::IdentifyRequestSent, None, EventPayload::None);

        state.identify_timer = Some(self.schedule_timer(TimerKind::Identify, self.timeouts.identify));
        self.maybe_finish_identification(state);
    }

    fn apply_identify_response(
        &self,
        state: &mut ConversationState,
        from: ContributorId,
        reply_to: Destination,
        info: ResponseInfo,
        time_to_deliver: Option<Duration>,
    ) -> HandleOutcome {
        let verdict = if info.code.is_positive_identification() {
            IdentifyVerdict::Positive
        } else {
            IdentifyVerdict::Negative(info)
        };

        match state
            .tracker
            .record_identification(from.clone(), reply_to, verdict.clone(), time_to_deliver)
        {
            TrackerUpdate::Recorded => {}
            TrackerUpdate::Duplicate => return HandleOutcome::Ignored(IgnoreReason::Duplicate),
            TrackerUpdate::NotExpected => return HandleOutcome::Ignored(IgnoreReason::NotExpected),
        }

        log_contributor!(
            debug,
            self.correlation_id(),
            from,
            "Contributor identified",
            positive = verdict.is_positive()
        );
        self.emit(
            OperationEventType::ComponentIdentified,
            Some(from),
            EventPayload::Identification {
                verdict,
                time_to_deliver,
            },
        );
        self.maybe_finish_identification(state);
        HandleOutcome::Applied
    }

    fn maybe_finish_identification(&self, state: &mut ConversationState) {
        let elapsed = state
            .identify_sent_at
            .map(|sent| self.scheduler.now().saturating_duration_since(sent))
            .unwrap_or_default();

        match guarded(|| {
            self.policy
                .is_identification_satisfied(&state.tracker, &self.context, elapsed)
        }) {
            Ok(true) => self.finish_identification(state),
            Ok(false) => {}
            Err(panic) => self.defect(state, format!("identification check panicked: {panic}")),
        }
    }

    // =========================================================================
    // Selecting
    // =========================================================================

    fn finish_identification(&self, state: &mut ConversationState) {
        if let Some(mut timer) = state.identify_timer.take() {
            timer.cancel();
        }
        state.phase = ConversationPhase::Selecting;

        let selected = match guarded(|| self.policy.select_contributors(&state.tracker, &self.context)) {
            Ok(Ok(selected)) if selected.is_empty() => {
                return self.fail_selection(state, TerminalReason::NoContributorAvailable);
            }
            Ok(Ok(selected)) => selected,
            Ok(Err(e)) => return self.fail_selection(state, e.into()),
            Err(panic) => {
                return self.defect(state, format!("contributor selection panicked: {panic}"));
            }
        };

        if let Err(e) = state.tracker.select(&selected) {
            return self.defect(state, format!("invalid selection: {e}"));
        }

        log_conversation!(
            info,
            self.correlation_id(),
            "Contributors selected",
            count = selected.len()
        );
        self.emit(
            OperationEventType::IdentificationComplete,
            None,
            EventPayload::Contributors(selected.clone()),
        );
        state.phase = ConversationPhase::Requesting;
        self.send_operation_requests(state, selected);
    }

    fn fail_selection(&self, state: &mut ConversationState, reason: TerminalReason) {
        state.tracker.drop_outstanding();
        log_conversation!(warn, self.correlation_id(), "Selection failed", reason = %reason);
        let outcome = AggregateOutcome::failure(reason, &state.tracker);
        self.terminate(state, outcome);
    }

    // =========================================================================
    // Requesting
    // =========================================================================

    fn send_operation_requests(&self, state: &mut ConversationState, selected: Vec<ContributorId>) {
        // All requests are built before any is sent, so a policy defect never
        // leaves a partially requested set behind.
        let mut requests = Vec::with_capacity(selected.len());
        for contributor in &selected {
            match guarded(|| self.policy.build_operation_request(contributor, &self.context)) {
                Ok(Ok(body)) => requests.push((contributor.clone(), body)),
                Ok(Err(e)) => {
                    return self.defect(state, format!("operation request for {contributor} rejected: {e}"));
                }
                Err(panic) => {
                    return self.defect(
                        state,
                        format!("building operation request for {contributor} panicked: {panic}"),
                    );
                }
            }
        }

        let mut send_failures = Vec::new();
        for (contributor, body) in requests {
            let Some(destination) = state
                .tracker
                .identification(&contributor)
                .map(|identification| identification.destination.clone())
            else {
                send_failures.push((contributor, "no known destination".to_string()));
                continue;
            };
            let message = self.message(body).to(contributor.clone());
            if let Err(e) = self.transport.send(&destination, message) {
                send_failures.push((contributor, e.to_string()));
            }
        }

        self.emit(
            OperationEventType::RequestSent,
            None,
            EventPayload::Contributors(selected),
        );

        for (contributor, error) in send_failures {
            let reason = FailureReason::SendFailed(error);
            if state.tracker.record_failure(&contributor, reason.clone()) == TrackerUpdate::Recorded {
                self.contributor_failed(contributor, reason);
            }
        }

        if state.tracker.all_selected_finished() {
            self.complete(state);
        } else {
            state.operation_timer =
                Some(self.schedule_timer(TimerKind::Operation, self.timeouts.operation));
        }
    }

    fn apply_progress(
        &self,
        state: &mut ConversationState,
        from: ContributorId,
        info: ResponseInfo,
    ) -> HandleOutcome {
        if !state.tracker.is_pending(&from) {
            return HandleOutcome::Ignored(IgnoreReason::NotExpected);
        }
        log_contributor!(debug, self.correlation_id(), from, "Progress", code = %info.code);
        self.emit(OperationEventType::Progress, Some(from), EventPayload::Progress(info));
        HandleOutcome::Applied
    }

    fn apply_final_response(
        &self,
        state: &mut ConversationState,
        from: ContributorId,
        info: ResponseInfo,
        result: Option<OperationResult>,
    ) -> HandleOutcome {
        if info.code.is_progress() {
            return HandleOutcome::Ignored(IgnoreReason::Malformed);
        }

        let update = if info.code.is_success() {
            let update = state.tracker.record_completion(&from, result.clone());
            if update == TrackerUpdate::Recorded {
                log_contributor!(info, self.correlation_id(), from, "Contributor completed");
                self.emit(
                    OperationEventType::ComponentComplete,
                    Some(from),
                    EventPayload::Result(result),
                );
            }
            update
        } else {
            let reason = FailureReason::Negative(info);
            let update = state.tracker.record_failure(&from, reason.clone());
            if update == TrackerUpdate::Recorded {
                self.contributor_failed(from, reason);
            }
            update
        };

        match update {
            TrackerUpdate::Recorded => {
                if state.tracker.all_selected_finished() {
                    self.complete(state);
                }
                HandleOutcome::Applied
            }
            TrackerUpdate::Duplicate => HandleOutcome::Ignored(IgnoreReason::Duplicate),
            TrackerUpdate::NotExpected => HandleOutcome::Ignored(IgnoreReason::NotExpected),
        }
    }

    fn contributor_failed(&self, contributor: ContributorId, reason: FailureReason) {
        CONTRIBUTOR_FAILURES.with_label_values(&[reason.kind()]).inc();
        log_contributor!(warn, self.correlation_id(), contributor, "Contributor failed", reason = %reason);
        self.emit(
            OperationEventType::ComponentFailed,
            Some(contributor),
            EventPayload::Failure(reason),
        );
    }

    fn apply(&self, state: &mut ConversationState, message: Message) -> HandleOutcome {
        if state.phase.is_terminated() {
            return HandleOutcome::Ignored(IgnoreReason::Terminated);
        }
        let kind = message.kind();
        if !state.phase.expects(kind) {
            return HandleOutcome::Ignored(IgnoreReason::UnexpectedKind {
                kind,
                phase: state.phase,
            });
        }
        if message.body.operation() != self.operation() {
            return HandleOutcome::Ignored(IgnoreReason::OperationMismatch);
        }

        let Message {
            from,
            reply_to,
            body,
            ..
        } = message;
        match body {
            MessageBody::IdentifyResponse {
                info,
                time_to_deliver,
                ..
            } => self.apply_identify_response(state, from, reply_to, info, time_to_deliver),
            MessageBody::ProgressResponse { info, .. } => self.apply_progress(state, from, info),
            MessageBody::FinalResponse { info, result, .. } => {
                self.apply_final_response(state, from, info, result)
            }
            // Requests are never accepted by `expects`.
            MessageBody::IdentifyRequest { .. } | MessageBody::OperationRequest { .. } => {
                HandleOutcome::Ignored(IgnoreReason::UnexpectedKind {
                    kind,
                    phase: state.phase,
                })
            }
        }
    }

    // =========================================================================
    // Completing / Terminated
    // =========================================================================

    fn complete(&self, state: &mut ConversationState) {
        if let Some(mut timer) = state.operation_timer.take() {
            timer.cancel();
        }
        state.phase = ConversationPhase::Completing;

        match guarded(|| self.policy.merge_final_result(&state.tracker)) {
            Ok(Ok(outcome)) => self.terminate(state, outcome),
            Ok(Err(e)) => self.defect(state, e.to_string()),
            Err(panic) => self.defect(state, format!("merging results panicked: {panic}")),
        }
    }

    fn defect(&self, state: &mut ConversationState, detail: String) {
        log_conversation!(error, self.correlation_id(), "Conversation defect", detail = %detail);
        let outcome = AggregateOutcome::failure(TerminalReason::Defect(detail), &state.tracker);
        self.terminate(state, outcome);
    }

    fn terminate(&self, state: &mut ConversationState, outcome: AggregateOutcome) {
        if state.phase.is_terminated() {
            return;
        }
        state.cancel_timers();
        state.phase = ConversationPhase::Terminated;

        let event_type = if outcome.is_success() {
            log_conversation!(info, self.correlation_id(), "Conversation complete", outcome = %outcome.describe());
            OperationEventType::Complete
        } else {
            log_conversation!(warn, self.correlation_id(), "Conversation failed", outcome = %outcome.describe());
            OperationEventType::Failed
        };
        state.outcome = Some(outcome.clone());
        self.emit(event_type, None, EventPayload::Outcome(outcome));
    }

    fn emit(&self, event_type: OperationEventType, contributor: Option<ContributorId>, payload: EventPayload) {
        let event = OperationEvent {
            correlation_id: self.context.correlation_id,
            collection_id: self.context.collection_id.clone(),
            operation: self.operation(),
            event_type,
            contributor,
            payload,
            timestamp: Utc::now(),
        };
        if let Err(panic) = guarded(|| self.sink.emit(event)) {
            log_conversation!(error, self.correlation_id(), "Event sink panicked", event = %event_type, panic = %panic);
        }
    }
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("correlation_id", &self.context.correlation_id)
            .field("operation", &self.operation())
            .field("phase", &self.phase())
            .finish()
    }
}

/// Run policy or sink code, turning a panic into its message.
fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
