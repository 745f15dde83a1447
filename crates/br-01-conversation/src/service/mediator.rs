//! Conversation Mediator - routes inbound messages to live conversations.
//!
//! Maps correlation ids to conversations. A conversation deregisters itself
//! exactly once, from its termination hook, so the map only ever holds live
//! conversations.
//!
//! Flow:
//! 1. `start_conversation()` validates the request, registers a new
//!    conversation and starts it
//! 2. The transport delivers responses on `receiver_destination`
//! 3. `dispatch()` looks the conversation up and hands the message over
//! 4. On termination the conversation removes itself from the map

use br_telemetry::{
    log_conversation, CONVERSATIONS_ACTIVE, CONVERSATIONS_COMPLETED, CONVERSATIONS_FAILED,
    CONVERSATIONS_STARTED, CONVERSATION_DURATION, MESSAGES_DISCARDED,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use shared_bus::{ListenerHandle, MessageListener, MessageTransport};
use shared_types::{CollectionId, ContributorId, CorrelationId, Message, OperationArgs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::conversation::{
    Conversation, ConversationSetup, ConversationSnapshot, HandleOutcome, IgnoreReason,
    Participants, TerminationHook,
};
use crate::adapters::{event_channel, OperationHandle};
use crate::config::ClientSettings;
use crate::domain::{AggregateOutcome, MediatorError, TerminalReason};
use crate::ports::{ConversationContext, EventSink, OperationPolicy, Scheduler};

/// Which contributors a conversation addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParticipantScope {
    /// The collection's configured contributors; all responders if none are configured.
    #[default]
    Configured,
    /// Exactly these contributors.
    Only(Vec<ContributorId>),
    /// Whoever answers before the identify deadline.
    AllResponders,
}

/// Caller-supplied parameters of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationParams {
    pub collection_id: CollectionId,
    pub args: OperationArgs,
    /// Contributor named by the caller, if any.
    pub target: Option<ContributorId>,
    pub audit_trail_information: Option<String>,
    pub participants: ParticipantScope,
}

impl ConversationParams {
    pub fn new(collection_id: CollectionId, args: OperationArgs) -> Self {
        Self {
            collection_id,
            args,
            target: None,
            audit_trail_information: None,
            participants: ParticipantScope::Configured,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: Option<ContributorId>) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn with_audit_trail_information(mut self, info: impl Into<String>) -> Self {
        self.audit_trail_information = Some(info.into());
        self
    }

    #[must_use]
    pub fn with_participants(mut self, participants: ParticipantScope) -> Self {
        self.participants = participants;
        self
    }
}

/// What `dispatch` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied,
    Ignored(IgnoreReason),
    /// No live conversation has this correlation id.
    UnknownCorrelation,
}

/// Statistics for the mediator
#[derive(Debug, Default)]
pub struct MediatorStats {
    /// Conversations started
    pub started: AtomicU64,
    /// Conversations ended with `Complete`
    pub completed: AtomicU64,
    /// Conversations ended with `Failed`
    pub failed: AtomicU64,
    /// Messages handed to a conversation
    pub dispatched: AtomicU64,
    /// Messages for no live conversation
    pub unknown_correlation: AtomicU64,
    /// Messages a conversation discarded
    pub ignored: AtomicU64,
}

/// The routing map, shared with the transport as listener.
struct Router {
    conversations: DashMap<CorrelationId, Arc<Conversation>>,
    stats: MediatorStats,
}

impl Router {
    fn dispatch(&self, message: Message) -> DispatchOutcome {
        // Clone out so no map guard is held while the conversation runs.
        let conversation = self
            .conversations
            .get(&message.correlation_id)
            .map(|entry| Arc::clone(entry.value()));

        let Some(conversation) = conversation else {
            self.stats.unknown_correlation.fetch_add(1, Ordering::Relaxed);
            MESSAGES_DISCARDED.with_label_values(&["unknown_correlation"]).inc();
            debug!(
                correlation_id = %message.correlation_id,
                from = %message.from,
                kind = ?message.kind(),
                "Discarding message for unknown conversation"
            );
            return DispatchOutcome::UnknownCorrelation;
        };

        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        match conversation.handle(message) {
            HandleOutcome::Applied => DispatchOutcome::Applied,
            HandleOutcome::Ignored(reason) => {
                self.stats.ignored.fetch_add(1, Ordering::Relaxed);
                MESSAGES_DISCARDED.with_label_values(&[reason.label()]).inc();
                DispatchOutcome::Ignored(reason)
            }
        }
    }

    fn finished(&self, correlation_id: CorrelationId, success: bool) {
        self.conversations.remove(&correlation_id);
        if success {
            self.stats.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn live(&self) -> Vec<Arc<Conversation>> {
        self.conversations
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

impl MessageListener for Router {
    fn on_message(&self, message: Message) {
        self.dispatch(message);
    }
}

/// Owns every live conversation of one client process.
pub struct ConversationMediator {
    settings: Arc<ClientSettings>,
    transport: Arc<dyn MessageTransport>,
    scheduler: Arc<dyn Scheduler>,
    router: Arc<Router>,
    listener: Mutex<Option<ListenerHandle>>,
    shut_down: AtomicBool,
}

impl ConversationMediator {
    pub fn new(
        settings: ClientSettings,
        transport: Arc<dyn MessageTransport>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            transport,
            scheduler,
            router: Arc::new(Router {
                conversations: DashMap::new(),
                stats: MediatorStats::default(),
            }),
            listener: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn stats(&self) -> &MediatorStats {
        &self.router.stats
    }

    /// Subscribe to `receiver_destination`.
    pub fn start(&self) -> Result<(), MediatorError> {
        if self.is_shut_down() {
            return Err(MediatorError::ShutDown);
        }
        let mut listener = self.listener.lock();
        if listener.is_some() {
            return Err(MediatorError::AlreadyStarted);
        }

        let router: Arc<dyn MessageListener> = self.router.clone();
        let handle = self
            .transport
            .subscribe(&self.settings.receiver_destination, router)?;
        info!(
            destination = %self.settings.receiver_destination,
            "Mediator listening for responses"
        );
        *listener = Some(handle);
        Ok(())
    }

    /// Create and start a conversation.
    ///
    /// Errors are refusals before any message is sent; everything that goes
    /// wrong later arrives as a `Failed` event on `sink`.
    pub fn start_conversation(
        &self,
        policy: Arc<dyn OperationPolicy>,
        params: ConversationParams,
        sink: Arc<dyn EventSink>,
    ) -> Result<CorrelationId, MediatorError> {
        if self.is_shut_down() {
            return Err(MediatorError::ShutDown);
        }
        let collection = self
            .settings
            .collection(&params.collection_id)
            .ok_or_else(|| MediatorError::UnknownCollection(params.collection_id.clone()))?;

        let operation = policy.operation();
        if params.args.kind() != operation {
            return Err(MediatorError::OperationMismatch {
                policy: operation,
                requested: params.args.kind(),
            });
        }
        policy.validate(&params.args)?;

        // A named target narrows the conversation to that contributor alone.
        let participants = match (&params.target, params.participants) {
            (Some(target), _) => Participants::Known(vec![target.clone()]),
            (None, ParticipantScope::Configured) if collection.contributors.is_empty() => {
                Participants::AllResponders
            }
            (None, ParticipantScope::Configured) => {
                Participants::Known(collection.contributors.clone())
            }
            (None, ParticipantScope::Only(contributors)) => Participants::Known(contributors),
            (None, ParticipantScope::AllResponders) => Participants::AllResponders,
        };

        let correlation_id = CorrelationId::new();
        let conversation = Conversation::new(ConversationSetup {
            context: ConversationContext {
                correlation_id,
                collection_id: params.collection_id,
                client_id: self.settings.client_id.clone(),
                reply_to: self.settings.receiver_destination.clone(),
                args: params.args,
                target: params.target,
                audit_trail_information: params.audit_trail_information,
            },
            policy,
            transport: Arc::clone(&self.transport),
            scheduler: Arc::clone(&self.scheduler),
            sink,
            broadcast: collection.destination.clone(),
            timeouts: self.settings.timeouts_for(operation),
            participants,
            on_terminated: Some(self.termination_hook(correlation_id)),
        });

        self.router
            .conversations
            .insert(correlation_id, Arc::clone(&conversation));
        self.router.stats.started.fetch_add(1, Ordering::Relaxed);
        CONVERSATIONS_STARTED.inc();
        CONVERSATIONS_ACTIVE.inc();
        log_conversation!(info, correlation_id, "Conversation started", operation = %operation);

        // Lost a race with shutdown: end it without sending anything.
        if self.is_shut_down() {
            conversation.fail(TerminalReason::MediatorShutDown);
        } else {
            conversation.start();
        }
        Ok(correlation_id)
    }

    /// Start a conversation whose events go to a new bounded channel.
    pub fn start_with_handle(
        &self,
        policy: Arc<dyn OperationPolicy>,
        params: ConversationParams,
    ) -> Result<OperationHandle, MediatorError> {
        let (sink, receiver) = event_channel(self.settings.event_channel_capacity);
        let correlation_id = self.start_conversation(policy, params, Arc::new(sink))?;
        Ok(OperationHandle::new(correlation_id, receiver))
    }

    fn termination_hook(&self, correlation_id: CorrelationId) -> TerminationHook {
        let router: Weak<Router> = Arc::downgrade(&self.router);
        Box::new(move |outcome: &AggregateOutcome, age: Duration| {
            CONVERSATIONS_ACTIVE.dec();
            CONVERSATION_DURATION.observe(age.as_secs_f64());
            if outcome.is_success() {
                CONVERSATIONS_COMPLETED.inc();
            } else {
                CONVERSATIONS_FAILED.inc();
            }
            if let Some(router) = router.upgrade() {
                router.finished(correlation_id, outcome.is_success());
            }
        })
    }

    /// Route an inbound message to its conversation.
    pub fn dispatch(&self, message: Message) -> DispatchOutcome {
        self.router.dispatch(message)
    }

    /// Stop listening, refuse new conversations and fail every live one.
    ///
    /// Returns the number of conversations failed. Idempotent.
    pub fn shutdown(&self) -> usize {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return 0;
        }
        drop(self.listener.lock().take());

        let failed = self
            .router
            .live()
            .into_iter()
            .filter(|conversation| conversation.fail(TerminalReason::MediatorShutDown))
            .count();
        info!(failed, "Mediator shut down");
        failed
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Fail every conversation older than `conversation_timeout`.
    pub fn expire_stale(&self) -> usize {
        let max_age = self.settings.timeouts.conversation_timeout();
        self.router
            .live()
            .into_iter()
            .filter(|conversation| conversation.age() >= max_age)
            .filter(|conversation| {
                warn!(
                    correlation_id = %conversation.correlation_id(),
                    age_ms = conversation.age().as_millis() as u64,
                    "Expiring stale conversation"
                );
                conversation.fail(TerminalReason::ConversationTimedOut)
            })
            .count()
    }

    /// Spawn [`cleanup_task`] at the configured `cleanup_interval_ms`.
    pub fn spawn_cleanup(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.settings.timeouts.cleanup_interval();
        tokio::spawn(cleanup_task(Arc::clone(self), interval))
    }

    pub fn active_count(&self) -> usize {
        self.router.conversations.len()
    }

    pub fn contains(&self, correlation_id: &CorrelationId) -> bool {
        self.router.conversations.contains_key(correlation_id)
    }

    pub fn snapshot(&self, correlation_id: &CorrelationId) -> Option<ConversationSnapshot> {
        let conversation = self
            .router
            .conversations
            .get(correlation_id)
            .map(|entry| Arc::clone(entry.value()))?;
        Some(conversation.snapshot())
    }
}

impl Drop for ConversationMediator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Background task expiring stale conversations until shutdown.
pub async fn cleanup_task(mediator: Arc<ConversationMediator>, interval: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        if mediator.is_shut_down() {
            break;
        }
        let expired = mediator.expire_stale();
        if expired > 0 {
            debug!(expired = expired, "Expired stale conversations");
        }
    }
}
