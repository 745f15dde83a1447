//! # Simulated Contributors
//!
//! Scripted pillars that answer a client over the in-memory bus, and a
//! fixture wiring a `RepositoryClient` to a set of them.

use br_01_conversation::{
    ClientSettings, CollectionSettings, MediatorError, TimeoutSettings, TokioScheduler,
};
use br_02_operations::{ClientError, RepositoryClient};
use chrono::Utc;
use parking_lot::Mutex;
use shared_bus::{InMemoryMessageBus, ListenerHandle, MessageListener, MessageTransport};
use shared_types::{
    CollectionId, ContributorId, ContributorStatus, Destination, Message, MessageBody,
    OperationArgs, OperationResult, ResponseCode, ResponseInfo,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const COLLECTION: &str = "books";
pub const BROADCAST: &str = "collection.books";

/// How a pillar answers identify requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifyScript {
    Positive { time_to_deliver: Option<Duration> },
    Negative,
    Silent,
}

/// How a pillar answers operation requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationScript {
    Complete,
    Fail(ResponseCode),
    Silent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub identify: IdentifyScript,
    /// Send a progress response before the final one.
    pub progress: bool,
    pub operation: OperationScript,
}

impl Script {
    /// Answers everything positively and immediately.
    pub fn cooperative() -> Self {
        Self {
            identify: IdentifyScript::Positive {
                time_to_deliver: Some(Duration::from_secs(1)),
            },
            progress: false,
            operation: OperationScript::Complete,
        }
    }

    pub fn silent() -> Self {
        Self {
            identify: IdentifyScript::Silent,
            progress: false,
            operation: OperationScript::Silent,
        }
    }

    pub fn time_to_deliver(mut self, ttd: Duration) -> Self {
        self.identify = IdentifyScript::Positive {
            time_to_deliver: Some(ttd),
        };
        self
    }

    pub fn identify(mut self, identify: IdentifyScript) -> Self {
        self.identify = identify;
        self
    }

    pub fn with_progress(mut self) -> Self {
        self.progress = true;
        self
    }

    pub fn operation(mut self, operation: OperationScript) -> Self {
        self.operation = operation;
        self
    }
}

/// A pillar listening on the collection broadcast and on its own inbox.
pub struct SimulatedContributor {
    id: ContributorId,
    inbox: Destination,
    transport: Arc<dyn MessageTransport>,
    script: Mutex<Script>,
    identify_requests: Mutex<Vec<Message>>,
    operation_requests: Mutex<Vec<Message>>,
    answered: AtomicUsize,
}

impl SimulatedContributor {
    pub fn new(name: &str, transport: Arc<dyn MessageTransport>, script: Script) -> Arc<Self> {
        Arc::new(Self {
            id: ContributorId::new(name),
            inbox: Destination::new(format!("{name}.inbox")),
            transport,
            script: Mutex::new(script),
            identify_requests: Mutex::new(Vec::new()),
            operation_requests: Mutex::new(Vec::new()),
            answered: AtomicUsize::new(0),
        })
    }

    /// Subscribe to `broadcast` and to the pillar's inbox.
    pub fn attach(
        self: &Arc<Self>,
        broadcast: &Destination,
    ) -> Result<Vec<ListenerHandle>, shared_bus::TransportError> {
        let listener: Arc<dyn MessageListener> = self.clone();
        Ok(vec![
            self.transport.subscribe(broadcast, Arc::clone(&listener))?,
            self.transport.subscribe(&self.inbox, listener)?,
        ])
    }

    pub fn id(&self) -> &ContributorId {
        &self.id
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock() = script;
    }

    pub fn identify_requests(&self) -> Vec<Message> {
        self.identify_requests.lock().clone()
    }

    pub fn operation_requests(&self) -> Vec<Message> {
        self.operation_requests.lock().clone()
    }

    /// Responses sent so far.
    pub fn answered(&self) -> usize {
        self.answered.load(Ordering::SeqCst)
    }

    fn respond(&self, request: &Message, body: MessageBody) {
        let reply = request.reply(self.id.clone(), self.inbox.clone(), body);
        match self.transport.send(&request.reply_to, reply) {
            Ok(()) => {
                self.answered.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => debug!(contributor = %self.id, error = %e, "Simulated reply not sent"),
        }
    }

    fn on_identify(&self, request: &Message) {
        self.identify_requests.lock().push(request.clone());
        let operation = request.body.operation();
        let (code, time_to_deliver) = match self.script.lock().identify.clone() {
            IdentifyScript::Silent => return,
            IdentifyScript::Negative => (ResponseCode::IdentificationNegative, None),
            IdentifyScript::Positive { time_to_deliver } => {
                (ResponseCode::IdentificationPositive, time_to_deliver)
            }
        };
        self.respond(
            request,
            MessageBody::IdentifyResponse {
                operation,
                info: ResponseInfo::new(code),
                time_to_deliver,
            },
        );
    }

    fn on_operation(&self, request: &Message, args: &OperationArgs) {
        self.operation_requests.lock().push(request.clone());
        let operation = request.body.operation();
        let script = self.script.lock().clone();

        if script.progress && script.operation != OperationScript::Silent {
            self.respond(
                request,
                MessageBody::ProgressResponse {
                    operation,
                    info: ResponseInfo::new(ResponseCode::OperationAcceptedProgress),
                },
            );
        }
        let (info, result) = match script.operation {
            OperationScript::Silent => return,
            OperationScript::Fail(code) => {
                (ResponseInfo::with_text(code, "scripted failure"), None)
            }
            OperationScript::Complete => (
                ResponseInfo::new(ResponseCode::OperationCompleted),
                Some(self.result_for(args)),
            ),
        };
        self.respond(
            request,
            MessageBody::FinalResponse {
                operation,
                info,
                result,
            },
        );
    }

    fn result_for(&self, args: &OperationArgs) -> OperationResult {
        match args {
            OperationArgs::GetFile { delivery_url, .. } => OperationResult::FileDelivered {
                url: delivery_url.clone(),
                size: Some(1024),
            },
            OperationArgs::GetFileIds { .. } => OperationResult::FileIds {
                entries: Vec::new(),
                partial: false,
            },
            OperationArgs::GetChecksums { .. } => OperationResult::Checksums {
                entries: Vec::new(),
                partial: false,
            },
            OperationArgs::GetAuditTrails { .. } => OperationResult::AuditTrails {
                events: Vec::new(),
                partial: false,
            },
            OperationArgs::GetStatus => OperationResult::Status(ContributorStatus {
                contributor: self.id.clone(),
                status_text: "ready".into(),
                reported_at: Utc::now(),
            }),
            OperationArgs::PutFile { .. } => OperationResult::FileStored { checksum: None },
            OperationArgs::ReplaceFile { .. } => {
                OperationResult::FileReplaced { new_checksum: None }
            }
            OperationArgs::DeleteFile { .. } => OperationResult::FileDeleted { checksum: None },
        }
    }
}

impl MessageListener for SimulatedContributor {
    fn on_message(&self, message: Message) {
        match &message.body {
            MessageBody::IdentifyRequest { .. } => self.on_identify(&message),
            MessageBody::OperationRequest { args, contributor } if *contributor == self.id => {
                self.on_operation(&message, args);
            }
            _ => {}
        }
    }
}

/// Settings for one collection served by `pillars`.
pub fn settings(pillars: &[&str]) -> ClientSettings {
    ClientSettings {
        collections: vec![CollectionSettings {
            id: CollectionId::new(COLLECTION),
            destination: Destination::new(BROADCAST),
            contributors: pillars.iter().map(|p| ContributorId::new(*p)).collect(),
        }],
        timeouts: TimeoutSettings {
            identify_timeout_ms: 10_000,
            operation_timeout_ms: 60_000,
            ..TimeoutSettings::default()
        },
        ..ClientSettings::default()
    }
}

/// A client and its pillars on one in-memory bus.
pub struct SimulatedRepository {
    pub bus: Arc<InMemoryMessageBus>,
    pub client: RepositoryClient,
    pillars: Vec<Arc<SimulatedContributor>>,
    _listeners: Vec<ListenerHandle>,
}

impl SimulatedRepository {
    /// Start a repository on the current tokio runtime.
    ///
    /// Every pillar named in `scripts` is also a configured contributor.
    pub fn start(scripts: Vec<(&str, Script)>) -> Result<Self, ClientError> {
        let names: Vec<&str> = scripts.iter().map(|(name, _)| *name).collect();
        Self::start_with(settings(&names), scripts)
    }

    pub fn start_with(
        settings: ClientSettings,
        scripts: Vec<(&str, Script)>,
    ) -> Result<Self, ClientError> {
        let bus = Arc::new(InMemoryMessageBus::new());
        let scheduler = TokioScheduler::current()
            .map_err(|e| MediatorError::from(shared_bus::TransportError::NoRuntime(e.to_string())))?;

        let mut pillars = Vec::new();
        let mut listeners = Vec::new();
        for (name, script) in scripts {
            let pillar = SimulatedContributor::new(name, bus.clone(), script);
            listeners.extend(
                pillar
                    .attach(&Destination::new(BROADCAST))
                    .map_err(MediatorError::from)?,
            );
            pillars.push(pillar);
        }

        let client = RepositoryClient::connect(settings, bus.clone(), Arc::new(scheduler))?;
        Ok(Self {
            bus,
            client,
            pillars,
            _listeners: listeners,
        })
    }

    pub fn pillar(&self, name: &str) -> &Arc<SimulatedContributor> {
        self.pillars
            .iter()
            .find(|p| p.id().as_str() == name)
            .unwrap_or_else(|| panic!("no pillar named {name}"))
    }

    pub fn pillars(&self) -> &[Arc<SimulatedContributor>] {
        &self.pillars
    }

    pub fn collection() -> CollectionId {
        CollectionId::new(COLLECTION)
    }
}
