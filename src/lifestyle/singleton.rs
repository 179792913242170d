use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use super::{create_instance, LifestyleManager};
use crate::activator::ComponentActivator;
use crate::burden::Burden;
use crate::context::CreationContext;
use crate::error::{DiError, DiResult};
use crate::internal::ConstructionGuard;
use crate::key::{ComponentName, Instance};
use crate::release_policy::ReleasePolicy;

/// One instance per kernel, created on first resolution.
///
/// Concurrent first resolutions block until a single creation completes; a
/// failed creation leaves the cell empty so the next call retries.
pub struct SingletonLifestyleManager {
    component: ComponentName,
    activator: Arc<dyn ComponentActivator>,
    cell: OnceCell<Arc<Burden>>,
    disposed: AtomicBool,
}

impl SingletonLifestyleManager {
    pub fn new(component: ComponentName, activator: Arc<dyn ComponentActivator>) -> Self {
        Self {
            component,
            activator,
            cell: OnceCell::new(),
            disposed: AtomicBool::new(false),
        }
    }

    fn instance_of(&self, burden: &Burden) -> DiResult<Instance> {
        burden
            .instance()
            .ok_or_else(|| DiError::Disposed(self.component.to_string()))
    }
}

impl LifestyleManager for SingletonLifestyleManager {
    fn resolve(&self, ctx: &CreationContext, _policy: &ReleasePolicy) -> DiResult<Instance> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(DiError::Disposed(self.component.to_string()));
        }
        if let Some(burden) = self.cell.get() {
            return self.instance_of(burden);
        }

        let _guard = ConstructionGuard::enter(self as *const Self as usize, self.component.as_str())?;
        let burden = self
            .cell
            .get_or_try_init(|| create_instance(ctx, &self.activator, true))?;
        self.instance_of(burden)
    }

    fn release(&self, instance: &Instance) -> bool {
        self.activator.destroy(instance);
        true
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(burden) = self.cell.get() {
            debug!(component = %self.component, "releasing singleton");
            burden.release();
        }
    }
}
