//! Policies of the modify cluster: operations that change stored data.

use br_01_conversation::{ConversationContext, OperationPolicy, PolicyError, SelectionStrategy};
use shared_types::{OperationArgs, OperationKind};

use super::{check_checksum, check_spec, expect_kind, require_non_empty, targeted_or};

/// PutFile: store a new file on every identified contributor.
#[derive(Debug, Clone, Default)]
pub struct PutFilePolicy;

impl OperationPolicy for PutFilePolicy {
    fn operation(&self) -> OperationKind {
        OperationKind::PutFile
    }

    fn validate(&self, args: &OperationArgs) -> Result<(), PolicyError> {
        expect_kind(self.operation(), args)?;
        if let OperationArgs::PutFile {
            file_id,
            url,
            checksum,
            return_checksum,
            ..
        } = args
        {
            require_non_empty("file_id", file_id)?;
            require_non_empty("url", url)?;
            if let Some(checksum) = checksum {
                check_checksum("checksum", checksum)?;
            }
            if let Some(spec) = return_checksum {
                check_spec("return checksum", spec)?;
            }
        }
        Ok(())
    }

    // A put goes to the whole collection, never to a single contributor.
    fn selection(&self, _ctx: &ConversationContext) -> SelectionStrategy {
        SelectionStrategy::AllIdentified
    }
}

/// ReplaceFile: swap a file's content, guarded by the existing checksum.
#[derive(Debug, Clone, Default)]
pub struct ReplaceFilePolicy;

impl OperationPolicy for ReplaceFilePolicy {
    fn operation(&self) -> OperationKind {
        OperationKind::ReplaceFile
    }

    fn validate(&self, args: &OperationArgs) -> Result<(), PolicyError> {
        expect_kind(self.operation(), args)?;
        if let OperationArgs::ReplaceFile {
            file_id,
            existing_checksum,
            new_url,
            new_checksum,
            ..
        } = args
        {
            require_non_empty("file_id", file_id)?;
            require_non_empty("new_url", new_url)?;
            check_checksum("existing checksum", existing_checksum)?;
            if let Some(checksum) = new_checksum {
                check_checksum("new checksum", checksum)?;
            }
        }
        Ok(())
    }

    fn selection(&self, ctx: &ConversationContext) -> SelectionStrategy {
        targeted_or(ctx, SelectionStrategy::AllIdentified)
    }
}

/// DeleteFile: remove a file from the named contributor or from all of them.
#[derive(Debug, Clone, Default)]
pub struct DeleteFilePolicy;

impl OperationPolicy for DeleteFilePolicy {
    fn operation(&self) -> OperationKind {
        OperationKind::DeleteFile
    }

    fn validate(&self, args: &OperationArgs) -> Result<(), PolicyError> {
        expect_kind(self.operation(), args)?;
        if let OperationArgs::DeleteFile {
            file_id,
            checksum,
            return_checksum,
        } = args
        {
            require_non_empty("file_id", file_id)?;
            if let Some(checksum) = checksum {
                check_checksum("checksum", checksum)?;
            }
            if let Some(spec) = return_checksum {
                check_spec("return checksum", spec)?;
            }
        }
        Ok(())
    }

    fn selection(&self, ctx: &ConversationContext) -> SelectionStrategy {
        targeted_or(ctx, SelectionStrategy::AllIdentified)
    }
}
