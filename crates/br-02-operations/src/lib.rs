//! # Bit Repository Operations
//!
//! The eight client operations as policies for the conversation engine, and
//! a typed client that runs them.
//!
//! ## Architecture
//!
//! ```text
//! RepositoryClient ──> PolicyRegistry ──> Arc<dyn OperationPolicy>
//!        │                                        │
//!        └──────> ConversationMediator <──────────┘
//!                         │
//!                  OperationHandle (events)
//! ```
//!
//! ## Clusters
//!
//! - **Access**: GetFile, GetFileIDs, GetChecksums, GetAuditTrails, GetStatus
//! - **Modify**: PutFile, ReplaceFile, DeleteFile
//!
//! Policies are immutable and shared by every conversation of their kind.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod policies;
pub mod registry;

pub use client::{AuditTrailQuery, ClientError, RepositoryClient, RequestOptions};
pub use policies::{
    DeleteFilePolicy, GetAuditTrailsPolicy, GetChecksumsPolicy, GetFileIdsPolicy, GetFilePolicy,
    GetStatusPolicy, PutFilePolicy, ReplaceFilePolicy,
};
pub use registry::PolicyRegistry;
