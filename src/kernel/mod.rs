//! The kernel: registration, resolution, release and teardown.

mod scope;

pub use scope::ScopeGuard;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use tracing::{debug, warn};

use crate::config::KernelOptions;
use crate::context::{Arguments, CreationContext};
use crate::descriptors::{ComponentModel, ModelContributor};
use crate::error::{DiError, DiResult};
use crate::handler::{GenericHandler, Handler, HandlerState};
use crate::key::{ComponentName, Instance, InstanceKey, ServiceType};
use crate::observer::{KernelObserver, Observers};
use crate::registration::Registry;
use crate::release_policy::ReleasePolicy;
use crate::resolver::{DependencyResolver, SubDependencyResolver};
use crate::scope::LifetimeScope;
use crate::traits::ResolverCore;

/// Dependency injection kernel.
///
/// Holds the registered components, resolves object graphs on demand and
/// tears them down deterministically. Cloning yields another handle to the
/// same kernel; it is disposed once the last handle, and any resolution
/// still running on another thread, lets go of it.
///
/// # Examples
///
/// ```rust
/// use ferrous_kernel::{ComponentModel, DependencyModel, Kernel, Lifestyle, Resolver};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// static CLOSED: AtomicUsize = AtomicUsize::new(0);
///
/// struct Pool;
/// struct Repository { _pool: Arc<Pool> }
///
/// let kernel = Kernel::new();
/// kernel.register(
///     ComponentModel::builder("pool")
///         .service::<Pool>()
///         .lifestyle(Lifestyle::Singleton)
///         .factory(|_| Ok(Pool))
///         .on_destroy(|_: &Pool| { CLOSED.fetch_add(1, Ordering::SeqCst); })
///         .build(),
/// ).unwrap();
/// kernel.register(
///     ComponentModel::builder("repository")
///         .service::<Repository>()
///         .depends_on(DependencyModel::of::<Pool>("pool"))
///         .factory(|ctx| Ok(Repository { _pool: ctx.dependency::<Pool>("pool")? }))
///         .build(),
/// ).unwrap();
///
/// let _repo = kernel.get_required::<Repository>();
/// kernel.dispose();
/// assert_eq!(CLOSED.load(Ordering::SeqCst), 1);
/// ```
pub struct Kernel {
    inner: Arc<KernelInner>,
}

pub(crate) struct KernelInner {
    id: u64,
    options: KernelOptions,
    registry: RwLock<Registry>,
    resolver: DependencyResolver,
    release_policy: ReleasePolicy,
    contributors: RwLock<Vec<Arc<dyn ModelContributor>>>,
    observers: RwLock<Observers>,
    disposed: AtomicBool,
}

impl Kernel {
    pub fn new() -> Self {
        Self::with_options(KernelOptions::default())
    }

    pub fn with_options(options: KernelOptions) -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self {
            inner: Arc::new(KernelInner {
                id: NEXT.fetch_add(1, Ordering::Relaxed),
                options,
                registry: RwLock::new(Registry::new()),
                resolver: DependencyResolver::default(),
                release_policy: ReleasePolicy::new(),
                contributors: RwLock::new(Vec::new()),
                observers: RwLock::new(Observers::default()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn options(&self) -> &KernelOptions {
        &self.inner.options
    }

    /// Registers a component; waiting handlers are re-evaluated afterwards.
    pub fn register(&self, model: ComponentModel) -> DiResult<()> {
        self.inner.register(model)
    }

    /// Registers components in order, stopping at the first failure.
    pub fn register_all<I>(&self, models: I) -> DiResult<()>
    where
        I: IntoIterator<Item = ComponentModel>,
    {
        for model in models {
            self.register(model)?;
        }
        Ok(())
    }

    /// Adds a contributor applied to every model registered afterwards.
    pub fn add_contributor(&self, contributor: Arc<dyn ModelContributor>) {
        self.inner.contributors.write().push(contributor);
    }

    pub fn add_sub_resolver(&self, resolver: Arc<dyn SubDependencyResolver>) {
        self.inner.resolver.add_sub_resolver(resolver);
    }

    pub fn add_observer(&self, observer: Arc<dyn KernelObserver>) {
        self.inner.observers.write().add(observer);
    }

    pub fn has_component(&self, name: &str) -> bool {
        self.inner.registry.read().contains_name(&ComponentName::new(name))
    }

    pub fn component_count(&self) -> usize {
        self.inner.registry.read().len()
    }

    pub fn handler(&self, name: &str) -> Option<Arc<Handler>> {
        self.inner.handler_by_name(&ComponentName::new(name))
    }

    pub fn handler_state(&self, name: &str) -> Option<HandlerState> {
        self.handler(name).map(|h| h.state())
    }

    /// Handlers still waiting on dependencies, each with the keys of the
    /// dependencies blocking it.
    pub fn waiting_handlers(&self) -> Vec<(ComponentName, Vec<String>)> {
        let registry = self.inner.registry.read();
        registry
            .waiting()
            .into_iter()
            .map(|handler| {
                let missing = self
                    .inner
                    .resolver
                    .missing_dependencies(&registry, handler.model())
                    .iter()
                    .map(|d| d.key().to_string())
                    .collect();
                (handler.model().name().clone(), missing)
            })
            .collect()
    }

    /// Resolves the default component for `service`.
    pub fn resolve(&self, service: &ServiceType) -> DiResult<Instance> {
        self.resolve_with(service, Arguments::new())
    }

    /// Resolves `service` with inline arguments for the top-level component.
    pub fn resolve_with(&self, service: &ServiceType, arguments: Arguments) -> DiResult<Instance> {
        let policy = self.inner.release_policy.clone();
        self.inner
            .top_level(service, arguments, &policy, |kernel, ctx| kernel.resolve_in(ctx, service))
    }

    /// Resolves `service`, tracking what it creates in `policy` instead of the
    /// kernel's own release policy.
    pub fn resolve_with_policy(
        &self,
        service: &ServiceType,
        arguments: Arguments,
        policy: &ReleasePolicy,
    ) -> DiResult<Instance> {
        self.inner
            .top_level(service, arguments, policy, |kernel, ctx| kernel.resolve_in(ctx, service))
    }

    pub fn resolve_named(&self, name: &str) -> DiResult<Instance> {
        self.resolve_named_with(name, Arguments::new())
    }

    pub fn resolve_named_with(&self, name: &str, arguments: Arguments) -> DiResult<Instance> {
        let name = ComponentName::new(name);
        let service = ServiceType::contract(name.as_str());
        let policy = self.inner.release_policy.clone();
        self.inner
            .top_level(&service, arguments, &policy, |kernel, ctx| kernel.resolve_named_in(ctx, &name))
    }

    /// `None` when nothing is registered for `service` or its dependencies
    /// cannot be satisfied; other failures still propagate.
    pub fn try_resolve(&self, service: &ServiceType) -> DiResult<Option<Instance>> {
        let policy = self.inner.release_policy.clone();
        self.inner.top_level(service, Arguments::new(), &policy, |kernel, ctx| {
            kernel.try_resolve_in(ctx, service)
        })
    }

    /// Instances of every component exposing `service`, in registration
    /// order, skipping components whose dependencies cannot be satisfied.
    pub fn resolve_all(&self, service: &ServiceType) -> DiResult<Vec<Instance>> {
        let policy = self.inner.release_policy.clone();
        self.inner.top_level(service, Arguments::new(), &policy, |kernel, ctx| {
            kernel.resolve_all_in(ctx, service)
        })
    }

    /// Releases an instance tracked by the kernel's release policy.
    ///
    /// Returns `false` when the instance is not tracked, e.g. singletons,
    /// scoped instances and transients without decommission steps.
    pub fn release(&self, instance: &Instance) -> bool {
        self.inner.release_policy.release(instance)
    }

    /// [`release`](Self::release) for a typed handle from [`Resolver::get`](crate::Resolver::get).
    ///
    /// Trait-object handles point into the stored `Arc<Arc<dyn T>>` and are
    /// not recognized; release those through the type-erased instance.
    pub fn release_typed<T: ?Sized>(&self, instance: &Arc<T>) -> bool {
        self.inner.release_policy.release_key(InstanceKey::of_arc(instance))
    }

    pub fn release_policy(&self) -> &ReleasePolicy {
        &self.inner.release_policy
    }

    /// Fresh policy for a batch of resolutions released together.
    pub fn create_sub_policy(&self) -> ReleasePolicy {
        self.inner.release_policy.create_sub_policy()
    }

    /// Opens a call-context scope on the current thread, closed when the
    /// guard drops.
    pub fn begin_scope(&self) -> ScopeGuard {
        ScopeGuard::begin(LifetimeScope::for_kernel(self.inner.id))
    }

    /// Scope not bound to the current thread, for use with `within_scope`.
    /// The caller disposes it.
    pub fn create_scope(&self) -> Arc<LifetimeScope> {
        LifetimeScope::for_kernel(self.inner.id)
    }

    /// Releases every tracked instance (newest first), then disposes the
    /// lifestyle managers in reverse registration order. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<KernelInner> {
        &self.inner
    }
}

impl KernelInner {
    pub(crate) fn options(&self) -> &KernelOptions {
        &self.options
    }

    pub(crate) fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    fn ensure_live(&self) -> DiResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(DiError::Disposed("kernel".into()));
        }
        Ok(())
    }

    fn observers(&self) -> Option<Observers> {
        let observers = self.observers.read();
        observers.has_observers().then(|| observers.clone())
    }

    fn register(self: &Arc<Self>, model: ComponentModel) -> DiResult<()> {
        self.ensure_live()?;
        let contributors = self.contributors.read().clone();
        let model = Arc::new(model.finalize(&contributors)?);

        let (state, promoted) = {
            let mut registry = self.registry.write();
            if registry.contains_name(model.name()) {
                return Err(DiError::Registration(format!(
                    "component '{}' is already registered",
                    model.name()
                )));
            }
            let state = if model.is_open_generic() {
                registry.insert_generic(GenericHandler::new(model.clone(), Arc::downgrade(self), self.id));
                HandlerState::Valid
            } else {
                let handler = Handler::new(model.clone(), Arc::downgrade(self), self.id);
                if self.resolver.missing_dependencies(&registry, &model).is_empty() {
                    handler.mark_valid();
                }
                let state = handler.state();
                registry.insert(handler);
                state
            };
            (state, self.promote_waiting(&registry))
        };

        debug!(
            component = %model.name(),
            lifestyle = %model.lifestyle().kind(),
            ?state,
            promoted = promoted.len(),
            "registered component"
        );
        if let Some(observers) = self.observers() {
            observers.registered(&model, state);
            for name in &promoted {
                observers.handler_state_changed(name, HandlerState::Valid);
            }
        }
        Ok(())
    }

    /// Promotes waiting handlers until no more become valid.
    fn promote_waiting(&self, registry: &Registry) -> Vec<ComponentName> {
        let mut promoted = Vec::new();
        loop {
            let mut changed = false;
            for handler in registry.waiting() {
                if self.resolver.missing_dependencies(registry, handler.model()).is_empty()
                    && handler.mark_valid()
                {
                    debug!(component = %handler.model().name(), "handler is now valid");
                    promoted.push(handler.model().name().clone());
                    changed = true;
                }
            }
            if !changed {
                return promoted;
            }
        }
    }

    pub(crate) fn handler_by_name(&self, name: &ComponentName) -> Option<Arc<Handler>> {
        self.registry.read().handler_by_name(name)
    }

    pub(crate) fn has_provider(&self, service: &ServiceType) -> bool {
        self.registry.read().has_provider(service)
    }

    /// Handlers able to serve `service`, closing open generics on demand.
    pub(crate) fn candidates(self: &Arc<Self>, service: &ServiceType) -> DiResult<Vec<Arc<Handler>>> {
        let registry = self.registry.upgradable_read();
        let mut handlers = registry.handlers_for(service);
        let generics = registry.generic_handlers_for(service);
        if generics.is_empty() {
            return Ok(handlers);
        }
        if generics.iter().all(|g| registry.closed(g, service).is_some()) {
            handlers.extend(generics.iter().filter_map(|g| registry.closed(g, service)));
            return Ok(handlers);
        }

        let mut registry = RwLockUpgradableReadGuard::upgrade(registry);
        for generic in &generics {
            let closed = match registry.closed(generic, service) {
                Some(handler) => handler,
                None => {
                    let handler = generic.close(service)?;
                    if self.resolver.missing_dependencies(&registry, handler.model()).is_empty() {
                        handler.mark_valid();
                    }
                    debug!(component = %handler.model().name(), "closed open generic component");
                    registry.insert_closed(generic, service, handler.clone());
                    handler
                }
            };
            handlers.push(closed);
        }
        Ok(handlers)
    }

    fn top_level<T, F>(
        self: &Arc<Self>,
        service: &ServiceType,
        arguments: Arguments,
        policy: &ReleasePolicy,
        op: F,
    ) -> DiResult<T>
    where
        F: FnOnce(&Arc<KernelInner>, &CreationContext) -> DiResult<T>,
    {
        self.ensure_live()?;
        let observers = self.observers();
        if let Some(observers) = &observers {
            observers.resolving(service);
        }
        let started = Instant::now();

        let ctx = CreationContext::new(self.clone(), Some(service.clone()), arguments, policy.clone());
        let result = op(self, &ctx);

        if let Some(observers) = &observers {
            match &result {
                Ok(_) => observers.resolved(service, started.elapsed()),
                Err(err) => observers.resolution_failed(service, err),
            }
        }
        result
    }

    /// Default handler for `service` that is not already being built in `ctx`.
    fn select_handler(self: &Arc<Self>, ctx: &CreationContext, service: &ServiceType) -> DiResult<Arc<Handler>> {
        let top_level = ctx.depth() == 0;
        let generation = {
            let registry = self.registry.read();
            if top_level {
                if let Some(handler) = registry.cached_default(service) {
                    return Ok(handler);
                }
            }
            registry.generation()
        };

        let candidates = self.candidates(service)?;
        let Some(first) = candidates.first() else {
            return Err(DiError::NotFound(service.display_name()));
        };
        let chosen = candidates
            .iter()
            .filter(|h| !ctx.is_in_resolution_context(h))
            .min_by_key(|h| h.state() != HandlerState::Valid)
            .cloned();
        match chosen {
            Some(handler) => {
                if top_level && handler.state() == HandlerState::Valid {
                    self.registry
                        .write()
                        .cache_default(generation, service.clone(), handler.clone());
                }
                Ok(handler)
            }
            None => {
                let mut chain = ctx.resolution_chain();
                chain.push(first.model().name().to_string());
                Err(DiError::Circular(chain))
            }
        }
    }

    pub(crate) fn resolve_in(self: &Arc<Self>, ctx: &CreationContext, service: &ServiceType) -> DiResult<Instance> {
        let handler = self.select_handler(ctx, service)?;
        match handler.resolve(ctx) {
            Err(err) if err.is_unsatisfied() => self.resolve_fallback(ctx, service, &handler, err),
            result => result,
        }
    }

    /// Tries the remaining candidates for `service` once the default could not
    /// be satisfied. The default's error is returned when none succeeds.
    fn resolve_fallback(
        self: &Arc<Self>,
        ctx: &CreationContext,
        service: &ServiceType,
        tried: &Arc<Handler>,
        error: DiError,
    ) -> DiResult<Instance> {
        let mut candidates = self.candidates(service)?;
        candidates.sort_by_key(|h| h.state() != HandlerState::Valid);
        for handler in &candidates {
            if Arc::ptr_eq(handler, tried) || ctx.is_in_resolution_context(handler) {
                continue;
            }
            match handler.resolve(ctx) {
                Ok(instance) => return Ok(instance),
                Err(err) if err.is_unsatisfied() => {}
                Err(err) => return Err(err),
            }
        }
        Err(error)
    }

    pub(crate) fn try_resolve_in(
        self: &Arc<Self>,
        ctx: &CreationContext,
        service: &ServiceType,
    ) -> DiResult<Option<Instance>> {
        match self.resolve_in(ctx, service) {
            Ok(instance) => Ok(Some(instance)),
            Err(DiError::NotFound(_)) => Ok(None),
            Err(err) if err.is_unsatisfied() => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub(crate) fn resolve_named_in(&self, ctx: &CreationContext, name: &ComponentName) -> DiResult<Instance> {
        let handler = self
            .handler_by_name(name)
            .ok_or_else(|| DiError::NotFound(name.to_string()))?;
        handler.resolve(ctx)
    }

    pub(crate) fn resolve_all_in(
        self: &Arc<Self>,
        ctx: &CreationContext,
        service: &ServiceType,
    ) -> DiResult<Vec<Instance>> {
        let mut instances = Vec::new();
        for handler in self.candidates(service)? {
            if ctx.is_in_resolution_context(&handler) {
                continue;
            }
            if let Some(instance) = handler.try_resolve(ctx)? {
                instances.push(instance);
            }
        }
        Ok(instances)
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(kernel = self.id, tracked = self.release_policy.tracked_count(), "disposing kernel");
        self.release_policy.dispose();
        let handlers = self.registry.read().handlers().to_vec();
        for handler in handlers.iter().rev() {
            handler.dispose();
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Kernel {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Drop for KernelInner {
    fn drop(&mut self) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let tracked = self.release_policy.tracked_count();
        if tracked > 0 && self.options.warn_on_undisposed_drop {
            warn!(tracked, "kernel dropped without dispose; releasing tracked instances");
        }
        self.dispose();
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("id", &self.inner.id)
            .field("components", &self.component_count())
            .field("tracked", &self.inner.release_policy.tracked_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl ResolverCore for Kernel {
    fn resolve_any(&self, service: &ServiceType) -> DiResult<Instance> {
        self.resolve(service)
    }

    fn resolve_named_any(&self, name: &ComponentName) -> DiResult<Instance> {
        self.resolve_named(name.as_str())
    }

    fn resolve_all_any(&self, service: &ServiceType) -> DiResult<Vec<Instance>> {
        self.resolve_all(service)
    }

    fn try_resolve_any(&self, service: &ServiceType) -> DiResult<Option<Instance>> {
        self.try_resolve(service)
    }
}
