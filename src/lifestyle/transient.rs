use std::sync::Arc;

use super::{create_instance, track, LifestyleManager};
use crate::activator::ComponentActivator;
use crate::context::CreationContext;
use crate::error::{DiError, DiResult};
use crate::key::Instance;
use crate::release_policy::ReleasePolicy;

/// New instance per resolution, never cached.
pub struct TransientLifestyleManager {
    activator: Arc<dyn ComponentActivator>,
}

impl TransientLifestyleManager {
    pub fn new(activator: Arc<dyn ComponentActivator>) -> Self {
        Self { activator }
    }
}

impl LifestyleManager for TransientLifestyleManager {
    fn resolve(&self, ctx: &CreationContext, policy: &ReleasePolicy) -> DiResult<Instance> {
        let burden = create_instance(ctx, &self.activator, false)?;
        track(&burden, policy)?;
        burden
            .instance()
            .ok_or_else(|| DiError::InvalidLifecycle(format!("'{}' produced no instance", burden.component())))
    }

    fn release(&self, instance: &Instance) -> bool {
        self.activator.destroy(instance);
        true
    }

    fn dispose(&self) {}
}
