//! # Policy Registry
//!
//! Maps each operation kind to the single shared policy instance that runs it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut registry = PolicyRegistry::standard(&settings);
//!
//! // Swap in a variant
//! registry.register(Arc::new(GetStatusPolicy::tolerant()));
//!
//! let policy = registry.get(OperationKind::GetStatus)?;
//! ```

use br_01_conversation::{ClientSettings, OperationPolicy};
use shared_types::OperationKind;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::policies::{
    DeleteFilePolicy, GetAuditTrailsPolicy, GetChecksumsPolicy, GetFileIdsPolicy, GetFilePolicy,
    GetStatusPolicy, PutFilePolicy, ReplaceFilePolicy,
};

/// Operation kind to policy.
#[derive(Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<OperationKind, Arc<dyn OperationPolicy>>,
}

impl PolicyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the default policy for every operation kind.
    pub fn standard(settings: &ClientSettings) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GetFilePolicy::new(settings.fastest_first_count)));
        registry.register(Arc::new(GetFileIdsPolicy));
        registry.register(Arc::new(GetChecksumsPolicy));
        registry.register(Arc::new(GetAuditTrailsPolicy::new()));
        registry.register(Arc::new(GetStatusPolicy::new()));
        registry.register(Arc::new(PutFilePolicy));
        registry.register(Arc::new(ReplaceFilePolicy));
        registry.register(Arc::new(DeleteFilePolicy));
        registry
    }

    /// Register a policy under its own operation kind.
    ///
    /// Returns the policy it replaced, if any.
    pub fn register(&mut self, policy: Arc<dyn OperationPolicy>) -> Option<Arc<dyn OperationPolicy>> {
        let kind = policy.operation();
        let previous = self.policies.insert(kind, policy);
        if previous.is_some() {
            warn!(operation = %kind, "Policy already registered, replacing");
        } else {
            debug!(operation = %kind, "Policy registered");
        }
        previous
    }

    pub fn get(&self, kind: OperationKind) -> Option<Arc<dyn OperationPolicy>> {
        self.policies.get(&kind).cloned()
    }

    pub fn is_registered(&self, kind: OperationKind) -> bool {
        self.policies.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.policies.keys().collect();
        kinds.sort();
        f.debug_struct("PolicyRegistry").field("operations", &kinds).finish()
    }
}
