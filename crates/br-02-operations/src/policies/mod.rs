//! One policy per operation kind.
//!
//! | Kind | Selection | Success |
//! |------|-----------|---------|
//! | GetFile | target, else fastest-first | at least one |
//! | GetFileIDs | target, else all identified | all selected |
//! | GetChecksums | target, else all identified | all selected |
//! | GetAuditTrails | target, else all identified | all selected (tolerant: at least one) |
//! | GetStatus | all identified | all selected (tolerant: at least one) |
//! | PutFile | all identified | all selected |
//! | ReplaceFile | target, else all identified | all selected |
//! | DeleteFile | target, else all identified | all selected |

mod access;
mod modify;

pub use access::{
    GetAuditTrailsPolicy, GetChecksumsPolicy, GetFileIdsPolicy, GetFilePolicy, GetStatusPolicy,
};
pub use modify::{DeleteFilePolicy, PutFilePolicy, ReplaceFilePolicy};

use br_01_conversation::{ConversationContext, PolicyError, SelectionStrategy};
use shared_types::{ChecksumData, ChecksumSpec, OperationArgs, OperationKind};

/// The caller's target if one was named, otherwise `fallback`.
fn targeted_or(ctx: &ConversationContext, fallback: SelectionStrategy) -> SelectionStrategy {
    match &ctx.target {
        Some(target) => SelectionStrategy::SpecificTarget(target.clone()),
        None => fallback,
    }
}

fn expect_kind(expected: OperationKind, args: &OperationArgs) -> Result<(), PolicyError> {
    if args.kind() == expected {
        Ok(())
    } else {
        Err(PolicyError::ArgumentMismatch {
            expected,
            actual: args.kind(),
        })
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), PolicyError> {
    if value.trim().is_empty() {
        Err(PolicyError::InvalidArguments(format!("{field} cannot be empty")))
    } else {
        Ok(())
    }
}

/// Keyed algorithms need a salt, plain ones must not carry one.
fn check_spec(field: &str, spec: &ChecksumSpec) -> Result<(), PolicyError> {
    match (spec.algorithm.requires_salt(), spec.salt.is_some()) {
        (true, false) => Err(PolicyError::InvalidArguments(format!(
            "{field}: {:?} requires a salt",
            spec.algorithm
        ))),
        (false, true) => Err(PolicyError::InvalidArguments(format!(
            "{field}: {:?} does not take a salt",
            spec.algorithm
        ))),
        _ => Ok(()),
    }
}

fn check_checksum(field: &str, checksum: &ChecksumData) -> Result<(), PolicyError> {
    check_spec(field, &checksum.spec)?;
    require_non_empty(field, &checksum.value)
}
