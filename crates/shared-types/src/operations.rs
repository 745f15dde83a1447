//! # Operations
//!
//! Operation kinds, their request arguments and the per-contributor result
//! payloads returned in final responses.
//!
//! ## Clusters
//!
//! - **Access**: GetFile, GetFileIDs, GetChecksums, GetAuditTrails, GetStatus
//! - **Modify**: PutFile, ReplaceFile, DeleteFile

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{ComponentId, ContributorId};

/// Every client-visible operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    GetFile,
    GetFileIds,
    GetChecksums,
    GetAuditTrails,
    GetStatus,
    PutFile,
    ReplaceFile,
    DeleteFile,
}

impl OperationKind {
    /// All operation kinds, in catalogue order.
    pub const ALL: [OperationKind; 8] = [
        Self::GetFile,
        Self::GetFileIds,
        Self::GetChecksums,
        Self::GetAuditTrails,
        Self::GetStatus,
        Self::PutFile,
        Self::ReplaceFile,
        Self::DeleteFile,
    ];

    /// Primitive name used in logs ("GetFile", "PutFile", ...).
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::GetFile => "GetFile",
            Self::GetFileIds => "GetFileIDs",
            Self::GetChecksums => "GetChecksums",
            Self::GetAuditTrails => "GetAuditTrails",
            Self::GetStatus => "GetStatus",
            Self::PutFile => "PutFile",
            Self::ReplaceFile => "ReplaceFile",
            Self::DeleteFile => "DeleteFile",
        }
    }

    /// True for operations that change stored data.
    #[must_use]
    pub fn is_modifying(self) -> bool {
        matches!(self, Self::PutFile | Self::ReplaceFile | Self::DeleteFile)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Checksum algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChecksumType {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    HmacMd5,
    HmacSha1,
    HmacSha256,
    HmacSha384,
    HmacSha512,
}

impl ChecksumType {
    /// True for keyed algorithms, which require a salt.
    #[must_use]
    pub fn requires_salt(self) -> bool {
        matches!(
            self,
            Self::HmacMd5 | Self::HmacSha1 | Self::HmacSha256 | Self::HmacSha384 | Self::HmacSha512
        )
    }
}

/// Checksum algorithm plus optional salt (hex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumSpec {
    pub algorithm: ChecksumType,
    pub salt: Option<String>,
}

impl ChecksumSpec {
    /// Unsalted checksum spec.
    pub fn plain(algorithm: ChecksumType) -> Self {
        Self {
            algorithm,
            salt: None,
        }
    }
}

impl Default for ChecksumSpec {
    fn default() -> Self {
        Self::plain(ChecksumType::Md5)
    }
}

/// A computed checksum value (hex encoded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumData {
    pub spec: ChecksumSpec,
    pub value: String,
    pub calculated_at: DateTime<Utc>,
}

/// Which files an access operation concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileSelection {
    /// Every file in the collection.
    AllFiles,
    /// A single file.
    File(String),
}

/// Arguments of an operation request; the variant determines the operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationArgs {
    GetFile {
        file_id: String,
        delivery_url: String,
    },
    GetFileIds {
        files: FileSelection,
        delivery_url: Option<String>,
    },
    GetChecksums {
        files: FileSelection,
        spec: ChecksumSpec,
        delivery_url: Option<String>,
    },
    GetAuditTrails {
        file_id: Option<String>,
        min_sequence: Option<u64>,
        max_sequence: Option<u64>,
        max_results: Option<u32>,
    },
    GetStatus,
    PutFile {
        file_id: String,
        url: String,
        size: u64,
        checksum: Option<ChecksumData>,
        return_checksum: Option<ChecksumSpec>,
    },
    ReplaceFile {
        file_id: String,
        existing_checksum: ChecksumData,
        new_url: String,
        new_size: u64,
        new_checksum: Option<ChecksumData>,
    },
    DeleteFile {
        file_id: String,
        checksum: Option<ChecksumData>,
        return_checksum: Option<ChecksumSpec>,
    },
}

impl OperationArgs {
    /// The operation kind these arguments belong to.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::GetFile { .. } => OperationKind::GetFile,
            Self::GetFileIds { .. } => OperationKind::GetFileIds,
            Self::GetChecksums { .. } => OperationKind::GetChecksums,
            Self::GetAuditTrails { .. } => OperationKind::GetAuditTrails,
            Self::GetStatus => OperationKind::GetStatus,
            Self::PutFile { .. } => OperationKind::PutFile,
            Self::ReplaceFile { .. } => OperationKind::ReplaceFile,
            Self::DeleteFile { .. } => OperationKind::DeleteFile,
        }
    }

    /// The file the operation concerns, if it names exactly one.
    #[must_use]
    pub fn file_id(&self) -> Option<&str> {
        match self {
            Self::GetFile { file_id, .. }
            | Self::PutFile { file_id, .. }
            | Self::ReplaceFile { file_id, .. }
            | Self::DeleteFile { file_id, .. } => Some(file_id),
            Self::GetFileIds { files, .. } | Self::GetChecksums { files, .. } => match files {
                FileSelection::File(file_id) => Some(file_id),
                FileSelection::AllFiles => None,
            },
            Self::GetAuditTrails { file_id, .. } => file_id.as_deref(),
            Self::GetStatus => None,
        }
    }
}

/// Checksum of one file as reported by a contributor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumEntry {
    pub file_id: String,
    pub checksum: String,
    pub calculated_at: DateTime<Utc>,
}

/// File id listing entry as reported by a contributor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIdEntry {
    pub file_id: String,
    pub last_modified: DateTime<Utc>,
    pub size: Option<u64>,
}

/// Kind of action recorded in an audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    FileMoved,
    ChecksumCalculated,
    PutFile,
    GetFile,
    DeleteFile,
    ReplaceFile,
    Failure,
    InconsistencyDetected,
    IntegrityCheck,
    Other,
}

/// One audit trail event as reported by a contributor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrailEvent {
    pub sequence: u64,
    pub file_id: Option<String>,
    pub actor: ComponentId,
    pub action: AuditAction,
    pub info: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Status report of a contributor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorStatus {
    pub contributor: ContributorId,
    pub status_text: String,
    pub reported_at: DateTime<Utc>,
}

/// Result payload carried by a successful final response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResult {
    FileDelivered { url: String, size: Option<u64> },
    FileIds { entries: Vec<FileIdEntry>, partial: bool },
    Checksums { entries: Vec<ChecksumEntry>, partial: bool },
    AuditTrails { events: Vec<AuditTrailEvent>, partial: bool },
    Status(ContributorStatus),
    FileStored { checksum: Option<ChecksumData> },
    FileReplaced { new_checksum: Option<ChecksumData> },
    FileDeleted { checksum: Option<ChecksumData> },
}
