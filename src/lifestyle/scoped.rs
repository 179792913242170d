use std::sync::Arc;

use super::{create_instance, LifestyleManager};
use crate::activator::ComponentActivator;
use crate::context::CreationContext;
use crate::error::{DiError, DiResult};
use crate::key::{ComponentName, Instance};
use crate::lifetime::LifestyleKind;
use crate::release_policy::ReleasePolicy;
use crate::scope::ScopeAccessor;

/// One instance per lifetime scope, as located by a [`ScopeAccessor`].
///
/// Backs the per-thread, scoped and bound lifestyles. The scope owns the
/// instance's burden, so nothing is tracked in the release policy.
pub struct ScopedLifestyleManager {
    component: ComponentName,
    kind: LifestyleKind,
    activator: Arc<dyn ComponentActivator>,
    accessor: Arc<dyn ScopeAccessor>,
}

impl ScopedLifestyleManager {
    pub fn new(
        component: ComponentName,
        kind: LifestyleKind,
        activator: Arc<dyn ComponentActivator>,
        accessor: Arc<dyn ScopeAccessor>,
    ) -> Self {
        Self {
            component,
            kind,
            activator,
            accessor,
        }
    }
}

impl LifestyleManager for ScopedLifestyleManager {
    fn resolve(&self, ctx: &CreationContext, _policy: &ReleasePolicy) -> DiResult<Instance> {
        let scope = self
            .accessor
            .get_scope(ctx)?
            .ok_or_else(|| DiError::MissingScope {
                component: self.component.to_string(),
                lifestyle: self.kind.as_str(),
                explanation: self.accessor.missing_scope_explanation(),
            })?;
        let burden = scope.get_cached_instance(&self.component, || {
            create_instance(ctx, &self.activator, true)
        })?;
        burden
            .instance()
            .ok_or_else(|| DiError::Disposed(format!("scoped instance of '{}'", self.component)))
    }

    fn release(&self, instance: &Instance) -> bool {
        self.activator.destroy(instance);
        true
    }

    fn dispose(&self) {
        self.accessor.dispose();
    }
}
