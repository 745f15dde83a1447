//! # Response Codes
//!
//! Every response from a contributor carries a `ResponseInfo`. The code tells
//! the conversation engine whether the message is a positive/negative
//! identification, a progress notice, or a final success/failure.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome classification carried by every contributor response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    /// The contributor can perform the operation.
    IdentificationPositive,
    /// The contributor declines the operation.
    IdentificationNegative,
    /// The request was accepted and work has started.
    OperationAcceptedProgress,
    /// Intermediate progress on an accepted request.
    OperationProgress,
    /// The operation finished successfully.
    OperationCompleted,
    /// The request could not be parsed or was inconsistent.
    RequestNotUnderstoodFailure,
    /// The contributor does not support this request.
    RequestNotSupported,
    /// The requested file does not exist at the contributor.
    FileNotFoundFailure,
    /// A file with the same id already exists.
    DuplicateFileFailure,
    /// The checksum of the existing file did not match.
    ExistingFileChecksumFailure,
    /// The checksum of the delivered file did not match.
    NewFileChecksumFailure,
    /// The file could not be transferred to or from the contributor.
    FileTransferFailure,
    /// Generic failure.
    Failure,
}

impl ResponseCode {
    /// True for the only code that makes a contributor eligible for selection.
    #[must_use]
    pub fn is_positive_identification(self) -> bool {
        matches!(self, Self::IdentificationPositive)
    }

    /// True for codes that report work in progress rather than an outcome.
    #[must_use]
    pub fn is_progress(self) -> bool {
        matches!(self, Self::OperationAcceptedProgress | Self::OperationProgress)
    }

    /// True if a final response with this code counts as success.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::OperationCompleted)
    }

    /// True for every failure code.
    #[must_use]
    pub fn is_failure(self) -> bool {
        !self.is_positive_identification() && !self.is_progress() && !self.is_success()
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::IdentificationPositive => "IDENTIFICATION_POSITIVE",
            Self::IdentificationNegative => "IDENTIFICATION_NEGATIVE",
            Self::OperationAcceptedProgress => "OPERATION_ACCEPTED_PROGRESS",
            Self::OperationProgress => "OPERATION_PROGRESS",
            Self::OperationCompleted => "OPERATION_COMPLETED",
            Self::RequestNotUnderstoodFailure => "REQUEST_NOT_UNDERSTOOD_FAILURE",
            Self::RequestNotSupported => "REQUEST_NOT_SUPPORTED",
            Self::FileNotFoundFailure => "FILE_NOT_FOUND_FAILURE",
            Self::DuplicateFileFailure => "DUPLICATE_FILE_FAILURE",
            Self::ExistingFileChecksumFailure => "EXISTING_FILE_CHECKSUM_FAILURE",
            Self::NewFileChecksumFailure => "NEW_FILE_CHECKSUM_FAILURE",
            Self::FileTransferFailure => "FILE_TRANSFER_FAILURE",
            Self::Failure => "FAILURE",
        };
        f.write_str(text)
    }
}

/// Code plus optional free text explaining it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub code: ResponseCode,
    pub text: Option<String>,
}

impl ResponseInfo {
    /// Response info without explanatory text.
    pub fn new(code: ResponseCode) -> Self {
        Self { code, text: None }
    }

    /// Response info with explanatory text.
    pub fn with_text(code: ResponseCode, text: impl Into<String>) -> Self {
        Self {
            code,
            text: Some(text.into()),
        }
    }

    /// Human-readable description used in failure reasons.
    pub fn describe(&self) -> String {
        match &self.text {
            Some(text) => format!("{}: {}", self.code, text),
            None => self.code.to_string(),
        }
    }
}
