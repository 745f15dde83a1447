//! # Repository Client
//!
//! Typed entry point for the eight operations. Each call validates its
//! arguments, starts one conversation on the shared mediator and returns the
//! `OperationHandle` its events arrive on.
//!
//! ```rust,ignore
//! let client = RepositoryClient::connect(settings, bus, Arc::new(TokioScheduler::new()))?;
//! let mut handle = client.get_status(CollectionId::new("books"), RequestOptions::default())?;
//! let terminal = handle.wait_for_terminal().await;
//! ```

use br_01_conversation::{
    ClientSettings, ConversationMediator, ConversationParams, EventSink, MediatorError,
    OperationHandle, ParticipantScope, Scheduler,
};
use shared_bus::MessageTransport;
use shared_types::{
    ChecksumData, ChecksumSpec, CollectionId, ContributorId, CorrelationId, FileSelection,
    OperationArgs, OperationKind,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::registry::PolicyRegistry;

/// Errors returned before an operation starts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// No policy is registered for the operation.
    #[error("no policy registered for {0}")]
    NoPolicy(OperationKind),

    /// The mediator refused to start the conversation.
    #[error(transparent)]
    Mediator(#[from] MediatorError),
}

/// Per-call options shared by every operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Address only this contributor, where the operation allows it.
    pub target: Option<ContributorId>,
    pub audit_trail_information: Option<String>,
    pub participants: ParticipantScope,
}

impl RequestOptions {
    pub fn target(mut self, contributor: ContributorId) -> Self {
        self.target = Some(contributor);
        self
    }

    pub fn audit_trail_information(mut self, info: impl Into<String>) -> Self {
        self.audit_trail_information = Some(info.into());
        self
    }

    pub fn participants(mut self, participants: ParticipantScope) -> Self {
        self.participants = participants;
        self
    }
}

/// Filters of an audit trail query. Everything unset means "no bound".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditTrailQuery {
    pub file_id: Option<String>,
    pub min_sequence: Option<u64>,
    pub max_sequence: Option<u64>,
    pub max_results: Option<u32>,
}

/// Client of a bit repository.
pub struct RepositoryClient {
    mediator: Arc<ConversationMediator>,
    registry: PolicyRegistry,
}

impl RepositoryClient {
    /// Client on an existing mediator, with the standard policies.
    pub fn new(mediator: Arc<ConversationMediator>) -> Self {
        let registry = PolicyRegistry::standard(mediator.settings());
        Self { mediator, registry }
    }

    /// Build a mediator on `transport`, start it and wrap it.
    pub fn connect(
        settings: ClientSettings,
        transport: Arc<dyn MessageTransport>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self, ClientError> {
        let mediator = Arc::new(ConversationMediator::new(settings, transport, scheduler));
        mediator.start()?;
        Ok(Self::new(mediator))
    }

    /// Replace the policy registry.
    pub fn with_registry(mut self, registry: PolicyRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn mediator(&self) -> &Arc<ConversationMediator> {
        &self.mediator
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Start any operation; its events go to a new bounded channel.
    pub fn start(&self, params: ConversationParams) -> Result<OperationHandle, ClientError> {
        let kind = params.args.kind();
        let policy = self.registry.get(kind).ok_or(ClientError::NoPolicy(kind))?;
        let handle = self.mediator.start_with_handle(policy, params)?;
        debug!(
            correlation_id = %handle.correlation_id(),
            operation = %kind,
            "Operation started"
        );
        Ok(handle)
    }

    /// Start any operation with a caller-supplied event sink.
    pub fn start_with_sink(
        &self,
        params: ConversationParams,
        sink: Arc<dyn EventSink>,
    ) -> Result<CorrelationId, ClientError> {
        let kind = params.args.kind();
        let policy = self.registry.get(kind).ok_or(ClientError::NoPolicy(kind))?;
        Ok(self.mediator.start_conversation(policy, params, sink)?)
    }

    fn run(
        &self,
        collection_id: CollectionId,
        args: OperationArgs,
        options: RequestOptions,
    ) -> Result<OperationHandle, ClientError> {
        let mut params = ConversationParams::new(collection_id, args)
            .with_target(options.target)
            .with_participants(options.participants);
        if let Some(info) = options.audit_trail_information {
            params = params.with_audit_trail_information(info);
        }
        self.start(params)
    }

    pub fn get_file(
        &self,
        collection_id: CollectionId,
        file_id: impl Into<String>,
        delivery_url: impl Into<String>,
        options: RequestOptions,
    ) -> Result<OperationHandle, ClientError> {
        let args = OperationArgs::GetFile {
            file_id: file_id.into(),
            delivery_url: delivery_url.into(),
        };
        self.run(collection_id, args, options)
    }

    pub fn get_file_ids(
        &self,
        collection_id: CollectionId,
        files: FileSelection,
        delivery_url: Option<String>,
        options: RequestOptions,
    ) -> Result<OperationHandle, ClientError> {
        let args = OperationArgs::GetFileIds {
            files,
            delivery_url,
        };
        self.run(collection_id, args, options)
    }

    pub fn get_checksums(
        &self,
        collection_id: CollectionId,
        files: FileSelection,
        spec: ChecksumSpec,
        delivery_url: Option<String>,
        options: RequestOptions,
    ) -> Result<OperationHandle, ClientError> {
        let args = OperationArgs::GetChecksums {
            files,
            spec,
            delivery_url,
        };
        self.run(collection_id, args, options)
    }

    pub fn get_audit_trails(
        &self,
        collection_id: CollectionId,
        query: AuditTrailQuery,
        options: RequestOptions,
    ) -> Result<OperationHandle, ClientError> {
        let args = OperationArgs::GetAuditTrails {
            file_id: query.file_id,
            min_sequence: query.min_sequence,
            max_sequence: query.max_sequence,
            max_results: query.max_results,
        };
        self.run(collection_id, args, options)
    }

    pub fn get_status(
        &self,
        collection_id: CollectionId,
        options: RequestOptions,
    ) -> Result<OperationHandle, ClientError> {
        self.run(collection_id, OperationArgs::GetStatus, options)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn put_file(
        &self,
        collection_id: CollectionId,
        file_id: impl Into<String>,
        url: impl Into<String>,
        size: u64,
        checksum: Option<ChecksumData>,
        return_checksum: Option<ChecksumSpec>,
        options: RequestOptions,
    ) -> Result<OperationHandle, ClientError> {
        let args = OperationArgs::PutFile {
            file_id: file_id.into(),
            url: url.into(),
            size,
            checksum,
            return_checksum,
        };
        self.run(collection_id, args, options)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn replace_file(
        &self,
        collection_id: CollectionId,
        file_id: impl Into<String>,
        existing_checksum: ChecksumData,
        new_url: impl Into<String>,
        new_size: u64,
        new_checksum: Option<ChecksumData>,
        options: RequestOptions,
    ) -> Result<OperationHandle, ClientError> {
        let args = OperationArgs::ReplaceFile {
            file_id: file_id.into(),
            existing_checksum,
            new_url: new_url.into(),
            new_size,
            new_checksum,
        };
        self.run(collection_id, args, options)
    }

    pub fn delete_file(
        &self,
        collection_id: CollectionId,
        file_id: impl Into<String>,
        checksum: Option<ChecksumData>,
        return_checksum: Option<ChecksumSpec>,
        options: RequestOptions,
    ) -> Result<OperationHandle, ClientError> {
        let args = OperationArgs::DeleteFile {
            file_id: file_id.into(),
            checksum,
            return_checksum,
        };
        self.run(collection_id, args, options)
    }

    /// Shut the mediator down; returns the number of conversations failed.
    pub fn shutdown(&self) -> usize {
        self.mediator.shutdown()
    }
}
