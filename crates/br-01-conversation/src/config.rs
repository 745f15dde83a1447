//! Client settings with validation.
//!
//! Loaded from TOML; every field has a default so a minimal file only lists
//! the collections:
//!
//! ```toml
//! client_id = "integrity-client"
//! receiver_destination = "client.integrity.receiver"
//!
//! [timeouts]
//! identify_timeout_ms = 10000
//! operation_timeout_ms = 60000
//!
//! [[operation_timeouts]]
//! operation = "get_file"
//! operation_timeout_ms = 3600000
//!
//! [[collections]]
//! id = "books"
//! destination = "collection.books"
//! contributors = ["pillar-1", "pillar-2"]
//! ```

use serde::{Deserialize, Serialize};
use shared_types::{CollectionId, ComponentId, ContributorId, Destination, OperationKind};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Settings of one client process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Identity used as `from` on outgoing messages.
    pub client_id: ComponentId,
    /// Destination the mediator listens on; used as `reply_to`.
    pub receiver_destination: Destination,
    pub timeouts: TimeoutSettings,
    /// Per-operation overrides of the identify/operation timeouts.
    pub operation_timeouts: Vec<OperationTimeoutOverride>,
    pub collections: Vec<CollectionSettings>,
    /// Buffered events per operation handle.
    pub event_channel_capacity: usize,
    /// How many contributors fastest-first selection picks.
    pub fastest_first_count: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            client_id: ComponentId::new("bitrepository-client"),
            receiver_destination: Destination::new("client.receiver"),
            timeouts: TimeoutSettings::default(),
            operation_timeouts: Vec::new(),
            collections: Vec::new(),
            event_channel_capacity: 1000,
            fastest_first_count: 1,
        }
    }
}

/// Timeout configuration in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub identify_timeout_ms: u64,
    pub operation_timeout_ms: u64,
    /// Maximum age of a conversation before the cleaner fails it.
    pub conversation_timeout_ms: u64,
    /// How often the cleaner runs.
    pub cleanup_interval_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            identify_timeout_ms: 10_000,
            operation_timeout_ms: 60_000,
            conversation_timeout_ms: 3_600_000,
            cleanup_interval_ms: 60_000,
        }
    }
}

impl TimeoutSettings {
    pub fn conversation_timeout(&self) -> Duration {
        Duration::from_millis(self.conversation_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationTimeoutOverride {
    pub operation: OperationKind,
    pub identify_timeout_ms: Option<u64>,
    pub operation_timeout_ms: Option<u64>,
}

/// A collection and the contributors expected to hold it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSettings {
    pub id: CollectionId,
    /// Broadcast destination for identify requests.
    pub destination: Destination,
    /// Known contributors. Empty means "whoever answers".
    #[serde(default)]
    pub contributors: Vec<ContributorId>,
}

/// The two phase deadlines of one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationTimeouts {
    pub identify: Duration,
    pub operation: Duration,
}

/// Configuration errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The settings file could not be read
    #[error("failed to read {path}: {error}")]
    Io { path: String, error: String },
    /// TOML parsing error
    #[error("failed to parse settings: {0}")]
    Parse(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Two collections share an id
    #[error("duplicate collection: {0}")]
    DuplicateCollection(CollectionId),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ClientSettings {
    /// Load and validate settings from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate settings from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `BR_*` environment overrides and re-validate.
    ///
    /// - `BR_CLIENT_ID`
    /// - `BR_RECEIVER_DESTINATION`
    /// - `BR_IDENTIFY_TIMEOUT_MS`
    /// - `BR_OPERATION_TIMEOUT_MS`
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(client_id) = lookup("BR_CLIENT_ID") {
            self.client_id = ComponentId::new(client_id);
        }
        if let Some(destination) = lookup("BR_RECEIVER_DESTINATION") {
            self.receiver_destination = Destination::new(destination);
        }
        if let Some(value) = lookup("BR_IDENTIFY_TIMEOUT_MS") {
            self.timeouts.identify_timeout_ms = parse_millis("BR_IDENTIFY_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("BR_OPERATION_TIMEOUT_MS") {
            self.timeouts.operation_timeout_ms = parse_millis("BR_OPERATION_TIMEOUT_MS", &value)?;
        }
        self.validate()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.is_empty() {
            return Err(ConfigError::Invalid("client_id cannot be empty".into()));
        }
        if self.receiver_destination.is_empty() {
            return Err(ConfigError::Invalid(
                "receiver_destination cannot be empty".into(),
            ));
        }

        let t = &self.timeouts;
        for (name, value) in [
            ("identify_timeout_ms", t.identify_timeout_ms),
            ("operation_timeout_ms", t.operation_timeout_ms),
            ("conversation_timeout_ms", t.conversation_timeout_ms),
            ("cleanup_interval_ms", t.cleanup_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidTimeout(format!("{name} cannot be 0")));
            }
        }
        for o in &self.operation_timeouts {
            if o.identify_timeout_ms == Some(0) || o.operation_timeout_ms == Some(0) {
                return Err(ConfigError::InvalidTimeout(format!(
                    "override for {} cannot be 0",
                    o.operation
                )));
            }
        }

        let mut seen = HashSet::new();
        for collection in &self.collections {
            if collection.id.is_empty() {
                return Err(ConfigError::Invalid("collection id cannot be empty".into()));
            }
            if collection.destination.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "collection {} has no destination",
                    collection.id
                )));
            }
            if !seen.insert(&collection.id) {
                return Err(ConfigError::DuplicateCollection(collection.id.clone()));
            }
        }

        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_channel_capacity cannot be 0".into(),
            ));
        }
        if self.fastest_first_count == 0 {
            return Err(ConfigError::Invalid("fastest_first_count cannot be 0".into()));
        }

        Ok(())
    }

    pub fn collection(&self, id: &CollectionId) -> Option<&CollectionSettings> {
        self.collections.iter().find(|c| &c.id == id)
    }

    /// Phase deadlines for an operation kind, overrides applied.
    pub fn timeouts_for(&self, operation: OperationKind) -> ConversationTimeouts {
        let mut identify = self.timeouts.identify_timeout_ms;
        let mut op = self.timeouts.operation_timeout_ms;
        if let Some(o) = self
            .operation_timeouts
            .iter()
            .find(|o| o.operation == operation)
        {
            identify = o.identify_timeout_ms.unwrap_or(identify);
            op = o.operation_timeout_ms.unwrap_or(op);
        }
        ConversationTimeouts {
            identify: Duration::from_millis(identify),
            operation: Duration::from_millis(op),
        }
    }
}

fn parse_millis(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key} must be milliseconds, got {value:?}")))
}
