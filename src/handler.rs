//! Handlers: the per-component resolution entry points.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;

use crate::activator::{ComponentActivator, FactoryActivator};
use crate::context::CreationContext;
use crate::descriptors::{ComponentModel, DependencyModel, DependencyOverride};
use crate::error::{DiError, DiResult};
use crate::kernel::KernelInner;
use crate::key::{Instance, ServiceType};
use crate::lifestyle::{create_manager, LifestyleManager};

/// Whether a handler's required dependencies are known to be satisfiable.
///
/// Transitions only from `WaitingDependency` to `Valid`, re-evaluated each
/// time a component is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "diagnostics", derive(serde::Serialize))]
pub enum HandlerState {
    Valid,
    WaitingDependency,
}

const VALID: u8 = 0;
const WAITING: u8 = 1;

/// Resolution entry point for one registered component.
///
/// Owns the component's activator and, created on first use, its lifestyle
/// manager.
pub struct Handler {
    model: Arc<ComponentModel>,
    activator: Arc<dyn ComponentActivator>,
    kernel: Weak<KernelInner>,
    kernel_id: u64,
    state: AtomicU8,
    manager: OnceCell<Arc<dyn LifestyleManager>>,
}

impl Handler {
    pub(crate) fn new(model: Arc<ComponentModel>, kernel: Weak<KernelInner>, kernel_id: u64) -> Arc<Self> {
        let activator = match &model.implementation.activator {
            Some(make) => make(model.clone()),
            None => Arc::new(FactoryActivator::new(model.clone())) as Arc<dyn ComponentActivator>,
        };
        Arc::new(Self {
            model,
            activator,
            kernel,
            kernel_id,
            state: AtomicU8::new(WAITING),
            manager: OnceCell::new(),
        })
    }

    pub fn model(&self) -> &Arc<ComponentModel> {
        &self.model
    }

    pub fn activator(&self) -> &Arc<dyn ComponentActivator> {
        &self.activator
    }

    pub fn state(&self) -> HandlerState {
        match self.state.load(Ordering::Acquire) {
            VALID => HandlerState::Valid,
            _ => HandlerState::WaitingDependency,
        }
    }

    /// Promotes the handler to `Valid`. Returns `false` if it already was.
    pub(crate) fn mark_valid(&self) -> bool {
        self.state.swap(VALID, Ordering::AcqRel) != VALID
    }

    /// Lifestyle manager, created on first use.
    pub fn lifestyle_manager(&self) -> &Arc<dyn LifestyleManager> {
        self.manager.get_or_init(|| {
            let default_pool = self
                .kernel
                .upgrade()
                .map(|kernel| kernel.options().default_pool)
                .unwrap_or_default();
            create_manager(&self.model, self.activator.clone(), self.kernel_id, default_pool)
        })
    }

    /// Produces an instance within `ctx`.
    ///
    /// Fails with a cycle error when this handler is already on `ctx`'s stack.
    /// A handler still waiting on dependencies is checked against what this
    /// particular call can supply before anything is built.
    pub fn resolve(self: &Arc<Self>, ctx: &CreationContext) -> DiResult<Instance> {
        if ctx.is_in_resolution_context(self) {
            let mut chain = ctx.resolution_chain();
            chain.push(self.model.name().to_string());
            return Err(DiError::Circular(chain));
        }

        let _frame = ctx.enter_resolution_context(self.clone())?;
        if self.state() == HandlerState::WaitingDependency {
            let kernel = self
                .kernel
                .upgrade()
                .ok_or_else(|| DiError::Disposed("kernel".into()))?;
            kernel.resolver().check_dynamic(&kernel, ctx, &self.model)?;
        }
        self.lifestyle_manager().resolve(ctx, ctx.release_policy())
    }

    /// Like [`resolve`](Self::resolve), with unsatisfiable dependencies
    /// reported as `None`.
    pub fn try_resolve(self: &Arc<Self>, ctx: &CreationContext) -> DiResult<Option<Instance>> {
        match self.resolve(ctx) {
            Ok(instance) => Ok(Some(instance)),
            Err(err) if err.is_unsatisfied() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// The override this component declares for `dependency`, if any.
    pub fn override_for(&self, dependency: &DependencyModel) -> Option<&DependencyOverride> {
        self.model.overrides().iter().find(|o| o.matches(dependency))
    }

    pub fn can_resolve_override(&self, dependency: &DependencyModel) -> bool {
        self.override_for(dependency).is_some()
    }

    /// Hands `instance` back to the lifestyle manager.
    pub fn release_instance(&self, instance: &Instance) -> bool {
        match self.manager.get() {
            Some(manager) => manager.release(instance),
            None => {
                self.activator.destroy(instance);
                true
            }
        }
    }

    pub(crate) fn dispose(&self) {
        if let Some(manager) = self.manager.get() {
            manager.dispose();
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("component", self.model.name())
            .field("lifestyle", self.model.lifestyle())
            .field("state", &self.state())
            .finish()
    }
}

/// Handler for an open-generic component; closes it per requested service.
pub struct GenericHandler {
    model: Arc<ComponentModel>,
    kernel: Weak<KernelInner>,
    kernel_id: u64,
}

impl GenericHandler {
    pub(crate) fn new(model: Arc<ComponentModel>, kernel: Weak<KernelInner>, kernel_id: u64) -> Arc<Self> {
        Arc::new(Self {
            model,
            kernel,
            kernel_id,
        })
    }

    pub fn model(&self) -> &Arc<ComponentModel> {
        &self.model
    }

    /// Builds the closed handler serving `service`.
    pub(crate) fn close(&self, service: &ServiceType) -> DiResult<Arc<Handler>> {
        let closed = self.model.close_over(service)?;
        Ok(Handler::new(Arc::new(closed), self.kernel.clone(), self.kernel_id))
    }
}

impl fmt::Debug for GenericHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericHandler")
            .field("component", self.model.name())
            .field("open_services", &self.model.open_services())
            .finish()
    }
}
