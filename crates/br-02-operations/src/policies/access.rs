//! Policies of the access cluster: operations that read from the collection.

use br_01_conversation::{
    ConversationContext, OperationPolicy, PolicyError, SelectionStrategy, SuccessCriterion,
};
use shared_types::{FileSelection, OperationArgs, OperationKind};

use super::{check_spec, expect_kind, require_non_empty, targeted_or};

fn check_selection(files: &FileSelection) -> Result<(), PolicyError> {
    match files {
        FileSelection::AllFiles => Ok(()),
        FileSelection::File(file_id) => require_non_empty("file_id", file_id),
    }
}

fn tolerant_criterion(tolerant: bool) -> SuccessCriterion {
    if tolerant {
        SuccessCriterion::AtLeast(1)
    } else {
        SuccessCriterion::AllSelected
    }
}

/// GetFile: one copy from the contributor that can deliver it soonest.
#[derive(Debug, Clone)]
pub struct GetFilePolicy {
    fastest_first_count: usize,
}

impl GetFilePolicy {
    /// `fastest_first_count` is clamped to at least 1.
    pub fn new(fastest_first_count: usize) -> Self {
        Self {
            fastest_first_count: fastest_first_count.max(1),
        }
    }
}

impl Default for GetFilePolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

impl OperationPolicy for GetFilePolicy {
    fn operation(&self) -> OperationKind {
        OperationKind::GetFile
    }

    fn validate(&self, args: &OperationArgs) -> Result<(), PolicyError> {
        expect_kind(self.operation(), args)?;
        if let OperationArgs::GetFile {
            file_id,
            delivery_url,
        } = args
        {
            require_non_empty("file_id", file_id)?;
            require_non_empty("delivery_url", delivery_url)?;
        }
        Ok(())
    }

    fn selection(&self, ctx: &ConversationContext) -> SelectionStrategy {
        targeted_or(
            ctx,
            SelectionStrategy::FastestFirst {
                count: self.fastest_first_count,
            },
        )
    }

    fn success_criterion(&self) -> SuccessCriterion {
        SuccessCriterion::AtLeast(1)
    }
}

/// GetFileIDs: file listings from every identified contributor.
#[derive(Debug, Clone, Default)]
pub struct GetFileIdsPolicy;

impl OperationPolicy for GetFileIdsPolicy {
    fn operation(&self) -> OperationKind {
        OperationKind::GetFileIds
    }

    fn validate(&self, args: &OperationArgs) -> Result<(), PolicyError> {
        expect_kind(self.operation(), args)?;
        if let OperationArgs::GetFileIds {
            files,
            delivery_url,
        } = args
        {
            check_selection(files)?;
            if let Some(url) = delivery_url {
                require_non_empty("delivery_url", url)?;
            }
        }
        Ok(())
    }

    fn selection(&self, ctx: &ConversationContext) -> SelectionStrategy {
        targeted_or(ctx, SelectionStrategy::AllIdentified)
    }
}

/// GetChecksums: checksums from every identified contributor.
#[derive(Debug, Clone, Default)]
pub struct GetChecksumsPolicy;

impl OperationPolicy for GetChecksumsPolicy {
    fn operation(&self) -> OperationKind {
        OperationKind::GetChecksums
    }

    fn validate(&self, args: &OperationArgs) -> Result<(), PolicyError> {
        expect_kind(self.operation(), args)?;
        if let OperationArgs::GetChecksums {
            files,
            spec,
            delivery_url,
        } = args
        {
            check_selection(files)?;
            check_spec("checksum spec", spec)?;
            if let Some(url) = delivery_url {
                require_non_empty("delivery_url", url)?;
            }
        }
        Ok(())
    }

    fn selection(&self, ctx: &ConversationContext) -> SelectionStrategy {
        targeted_or(ctx, SelectionStrategy::AllIdentified)
    }
}

/// GetAuditTrails: audit events from every identified contributor.
///
/// A tolerant policy succeeds as soon as one contributor delivered.
#[derive(Debug, Clone, Default)]
pub struct GetAuditTrailsPolicy {
    tolerant: bool,
}

impl GetAuditTrailsPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tolerant() -> Self {
        Self { tolerant: true }
    }
}

impl OperationPolicy for GetAuditTrailsPolicy {
    fn operation(&self) -> OperationKind {
        OperationKind::GetAuditTrails
    }

    fn validate(&self, args: &OperationArgs) -> Result<(), PolicyError> {
        expect_kind(self.operation(), args)?;
        if let OperationArgs::GetAuditTrails {
            file_id,
            min_sequence,
            max_sequence,
            max_results,
        } = args
        {
            if let Some(file_id) = file_id {
                require_non_empty("file_id", file_id)?;
            }
            if let (Some(min), Some(max)) = (min_sequence, max_sequence) {
                if min > max {
                    return Err(PolicyError::InvalidArguments(format!(
                        "min_sequence {min} is above max_sequence {max}"
                    )));
                }
            }
            if *max_results == Some(0) {
                return Err(PolicyError::InvalidArguments(
                    "max_results must be positive".into(),
                ));
            }
        }
        Ok(())
    }

    fn selection(&self, ctx: &ConversationContext) -> SelectionStrategy {
        targeted_or(ctx, SelectionStrategy::AllIdentified)
    }

    fn success_criterion(&self) -> SuccessCriterion {
        tolerant_criterion(self.tolerant)
    }
}

/// GetStatus: status of every identified contributor. Ignores any target.
#[derive(Debug, Clone, Default)]
pub struct GetStatusPolicy {
    tolerant: bool,
}

impl GetStatusPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tolerant() -> Self {
        Self { tolerant: true }
    }
}

impl OperationPolicy for GetStatusPolicy {
    fn operation(&self) -> OperationKind {
        OperationKind::GetStatus
    }

    fn selection(&self, _ctx: &ConversationContext) -> SelectionStrategy {
        SelectionStrategy::AllIdentified
    }

    fn success_criterion(&self) -> SuccessCriterion {
        tolerant_criterion(self.tolerant)
    }
}
