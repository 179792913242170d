//! Lifestyle managers: per-component policies for instance reuse.
//!
//! Every handler owns exactly one [`LifestyleManager`], created lazily from
//! the component's [`Lifestyle`]. Managers decide when an instance is
//! created, how long it is reused, and what releasing it means.

mod pooled;
mod scoped;
mod singleton;
mod transient;

pub use pooled::PooledLifestyleManager;
pub use scoped::ScopedLifestyleManager;
pub use singleton::SingletonLifestyleManager;
pub use transient::TransientLifestyleManager;

use std::sync::Arc;

use crate::activator::ComponentActivator;
use crate::burden::Burden;
use crate::context::CreationContext;
use crate::descriptors::ComponentModel;
use crate::error::{DiError, DiResult};
use crate::key::Instance;
use crate::lifetime::{Lifestyle, LifestyleKind, PoolSettings};
use crate::release_policy::ReleasePolicy;
use crate::scope::{BoundScopeAccessor, CallContextScopeAccessor, ThreadScopeAccessor};

/// Instance reuse policy of one component.
pub trait LifestyleManager: Send + Sync {
    /// Returns an instance for the handler on top of `ctx`'s resolution stack.
    fn resolve(&self, ctx: &CreationContext, policy: &ReleasePolicy) -> DiResult<Instance>;

    /// Lets go of `instance`. `true` when it was destroyed or returned to a pool.
    fn release(&self, instance: &Instance) -> bool;

    /// Tears down everything the manager still holds.
    fn dispose(&self);
}

/// Builds the manager for [`Lifestyle::Custom`].
pub trait LifestyleManagerFactory: Send + Sync {
    fn create(
        &self,
        model: Arc<ComponentModel>,
        activator: Arc<dyn ComponentActivator>,
    ) -> Arc<dyn LifestyleManager>;
}

impl<F> LifestyleManagerFactory for F
where
    F: Fn(Arc<ComponentModel>, Arc<dyn ComponentActivator>) -> Arc<dyn LifestyleManager> + Send + Sync,
{
    fn create(
        &self,
        model: Arc<ComponentModel>,
        activator: Arc<dyn ComponentActivator>,
    ) -> Arc<dyn LifestyleManager> {
        self(model, activator)
    }
}

pub(crate) fn create_manager(
    model: &Arc<ComponentModel>,
    activator: Arc<dyn ComponentActivator>,
    kernel_id: u64,
    default_pool: PoolSettings,
) -> Arc<dyn LifestyleManager> {
    let name = model.name().clone();
    match model.lifestyle() {
        Lifestyle::Transient => Arc::new(TransientLifestyleManager::new(activator)),
        Lifestyle::Singleton => Arc::new(SingletonLifestyleManager::new(name, activator)),
        Lifestyle::PerThread => Arc::new(ScopedLifestyleManager::new(
            name,
            LifestyleKind::PerThread,
            activator,
            Arc::new(ThreadScopeAccessor::new()),
        )),
        Lifestyle::Scoped(accessor) => Arc::new(ScopedLifestyleManager::new(
            name,
            LifestyleKind::Scoped,
            activator,
            accessor
                .clone()
                .unwrap_or_else(|| Arc::new(CallContextScopeAccessor::for_kernel(kernel_id))),
        )),
        Lifestyle::Bound(selector) => Arc::new(ScopedLifestyleManager::new(
            name,
            LifestyleKind::Bound,
            activator,
            Arc::new(BoundScopeAccessor::new(selector.clone())),
        )),
        Lifestyle::Pooled(settings) => Arc::new(PooledLifestyleManager::new(
            model.clone(),
            activator,
            settings.unwrap_or(default_pool),
        )),
        Lifestyle::Custom(factory) => factory.create(model.clone(), activator),
    }
}

/// Creates a burden on the current frame and activates an instance into it.
///
/// On activation failure the partial burden is released (which releases the
/// dependencies already attached to it) before the error propagates.
pub fn create_instance(
    ctx: &CreationContext,
    activator: &Arc<dyn ComponentActivator>,
    tracked_externally: bool,
) -> DiResult<Arc<Burden>> {
    let burden = ctx.create_burden(activator.clone(), tracked_externally)?;
    let instance = match activator.create(ctx, &burden) {
        Ok(instance) => instance,
        Err(err) => {
            burden.release();
            return Err(err);
        }
    };
    if let Err(err) = burden.set_instance(instance.clone()) {
        activator.destroy(&instance);
        burden.release();
        return Err(err);
    }
    Ok(burden)
}

/// Tracks the burden in `policy` when it can only be released through one.
pub fn track(burden: &Arc<Burden>, policy: &ReleasePolicy) -> DiResult<()> {
    if !burden.requires_policy_release() {
        return Ok(());
    }
    let instance = burden.instance().ok_or_else(|| {
        DiError::InvalidLifecycle(format!(
            "burden of '{}' has no instance to track",
            burden.component()
        ))
    })?;
    policy.track(&instance, burden.clone())
}
