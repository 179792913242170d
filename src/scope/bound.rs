//! Scopes stashed on an ancestor in the resolution path.

use std::sync::Arc;

use super::{LifetimeScope, ScopeAccessor};
use crate::context::CreationContext;
use crate::error::DiResult;
use crate::lifetime::ScopeRootSelector;

/// Shares one instance per selected ancestor.
///
/// The instance is cached in a scope stored on the ancestor's burden, so it
/// lives exactly as long as that ancestor. When the bound instance needs
/// decommissioning the ancestor's burden is marked as needing it too.
pub struct BoundScopeAccessor {
    selector: ScopeRootSelector,
}

impl BoundScopeAccessor {
    pub fn new(selector: ScopeRootSelector) -> Self {
        Self { selector }
    }
}

impl ScopeAccessor for BoundScopeAccessor {
    fn get_scope(&self, ctx: &CreationContext) -> DiResult<Option<Arc<LifetimeScope>>> {
        let ancestors = ctx.ancestor_handlers();
        let Some(index) = self.selector.select(&ancestors) else {
            return Ok(None);
        };
        Ok(ctx.frame_burden(index).map(|burden| burden.scope_stash()))
    }

    fn missing_scope_explanation(&self) -> String {
        format!(
            "no ancestor in the current resolution matches {:?}",
            self.selector
        )
    }
}
