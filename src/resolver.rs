//! Dependency resolution for one declared dependency.
//!
//! Sources are consulted in a fixed order and the first that yields a value
//! wins:
//!
//! 1. inline arguments of the current frame
//! 2. overrides declared on the component being built
//! 3. overrides declared on its parent in the resolution path
//! 4. registered [`SubDependencyResolver`]s, in registration order
//! 5. the kernel's handlers (by referenced name, else by service type)
//!
//! When nothing matches, the dependency's default value is used, then `None`
//! for optional dependencies; required ones fail.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::context::CreationContext;
use crate::descriptors::{ComponentModel, DependencyModel, DependencyOverride, OverrideValue};
use crate::error::{DiError, DiResult};
use crate::handler::{Handler, HandlerState};
use crate::kernel::KernelInner;
use crate::key::Instance;
use crate::registration::Registry;

/// One dependency lookup handed to a [`SubDependencyResolver`].
pub struct DependencyRequest<'a> {
    pub model: &'a ComponentModel,
    pub dependency: &'a DependencyModel,
    /// `None` during registration-time satisfiability checks
    pub context: Option<&'a CreationContext>,
}

/// Pluggable source of dependency values, consulted before the registry.
///
/// # Examples
///
/// ```rust
/// use ferrous_kernel::{
///     ComponentModel, DependencyModel, DependencyRequest, DiResult, Instance, Kernel, Resolver,
///     SubDependencyResolver,
/// };
/// use std::sync::Arc;
///
/// struct Settings;
/// impl SubDependencyResolver for Settings {
///     fn can_resolve(&self, request: &DependencyRequest<'_>) -> bool {
///         request.dependency.key().as_str() == "timeout_ms"
///     }
///     fn resolve(&self, _request: &DependencyRequest<'_>) -> DiResult<Option<Instance>> {
///         Ok(Some(Arc::new(250u64)))
///     }
/// }
///
/// struct Client { timeout_ms: u64 }
///
/// let kernel = Kernel::new();
/// kernel.add_sub_resolver(Arc::new(Settings));
/// kernel.register(
///     ComponentModel::builder("client")
///         .service::<Client>()
///         .depends_on(DependencyModel::of::<u64>("timeout_ms"))
///         .factory(|ctx| Ok(Client { timeout_ms: *ctx.dependency::<u64>("timeout_ms")? }))
///         .build(),
/// ).unwrap();
///
/// assert_eq!(kernel.get_required::<Client>().timeout_ms, 250);
/// ```
pub trait SubDependencyResolver: Send + Sync {
    fn can_resolve(&self, request: &DependencyRequest<'_>) -> bool;

    /// Value for the dependency; `None` lets later sources try.
    fn resolve(&self, request: &DependencyRequest<'_>) -> DiResult<Option<Instance>>;
}

enum RegistryLookup {
    Resolved(Instance),
    /// Every candidate is already being built higher up the stack
    InProgress(Vec<String>),
    Missing,
}

#[derive(Default)]
pub(crate) struct DependencyResolver {
    sub_resolvers: RwLock<Vec<Arc<dyn SubDependencyResolver>>>,
}

impl DependencyResolver {
    pub(crate) fn add_sub_resolver(&self, resolver: Arc<dyn SubDependencyResolver>) {
        self.sub_resolvers.write().push(resolver);
    }

    fn sub_resolvers(&self) -> Vec<Arc<dyn SubDependencyResolver>> {
        self.sub_resolvers.read().clone()
    }

    pub(crate) fn resolve(
        &self,
        kernel: &Arc<KernelInner>,
        ctx: &CreationContext,
        parent: Option<&Handler>,
        model: &ComponentModel,
        dependency: &DependencyModel,
    ) -> DiResult<Option<Instance>> {
        if let Some(value) = ctx.arguments().lookup(dependency) {
            trace!(component = %model.name(), dependency = %dependency.key(), "satisfied by inline argument");
            return Ok(Some(value));
        }

        if let Some(found) = find_override(model.overrides(), dependency) {
            trace!(component = %model.name(), dependency = %dependency.key(), "satisfied by own override");
            return self.apply_override(kernel, ctx, found, dependency).map(Some);
        }

        if let Some(parent) = parent {
            if let Some(found) = parent.override_for(dependency) {
                trace!(component = %model.name(), dependency = %dependency.key(), "satisfied by parent override");
                return self.apply_override(kernel, ctx, found, dependency).map(Some);
            }
        }

        let request = DependencyRequest {
            model,
            dependency,
            context: Some(ctx),
        };
        for sub in self.sub_resolvers() {
            if sub.can_resolve(&request) {
                if let Some(value) = sub.resolve(&request)? {
                    return Ok(Some(value));
                }
            }
        }

        let lookup = self.from_registry(kernel, ctx, dependency)?;
        let in_progress = match lookup {
            RegistryLookup::Resolved(value) => return Ok(Some(value)),
            RegistryLookup::InProgress(chain) => Some(chain),
            RegistryLookup::Missing => None,
        };

        if let Some(default) = dependency.default_value() {
            return Ok(Some(default.clone()));
        }
        if dependency.is_optional() {
            return Ok(None);
        }
        match in_progress {
            Some(chain) => Err(DiError::Circular(chain)),
            None => Err(unsatisfied(model, dependency)),
        }
    }

    fn apply_override(
        &self,
        kernel: &Arc<KernelInner>,
        ctx: &CreationContext,
        found: &DependencyOverride,
        dependency: &DependencyModel,
    ) -> DiResult<Instance> {
        match &found.value {
            OverrideValue::Value(value) => Ok(value.clone()),
            OverrideValue::Component(name) => {
                let handler = kernel.handler_by_name(name).ok_or_else(|| {
                    DiError::NotFound(format!("{} (override for '{}')", name, dependency.key()))
                })?;
                resolve_nested(ctx, &handler)
            }
        }
    }

    fn from_registry(
        &self,
        kernel: &Arc<KernelInner>,
        ctx: &CreationContext,
        dependency: &DependencyModel,
    ) -> DiResult<RegistryLookup> {
        let candidates: Vec<Arc<Handler>> = match dependency.referenced_component() {
            Some(name) => kernel.handler_by_name(name).into_iter().collect(),
            None => {
                let mut candidates = kernel.candidates(dependency.target())?;
                // Valid handlers first, registration order within each group.
                candidates.sort_by_key(|h| h.state() != HandlerState::Valid);
                candidates
            }
        };

        let mut in_progress = None;
        let mut first_failure = None;
        for handler in &candidates {
            if ctx.is_in_resolution_context(handler) {
                in_progress.get_or_insert_with(|| cycle_path(ctx, handler));
                continue;
            }
            match handler.resolve(ctx) {
                Ok(value) => return Ok(RegistryLookup::Resolved(value)),
                Err(err) if err.is_unsatisfied() => {
                    first_failure.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }

        match first_failure {
            Some(err) if !dependency.is_optional() && !dependency.has_default() => Err(err),
            _ => Ok(in_progress.map_or(RegistryLookup::Missing, RegistryLookup::InProgress)),
        }
    }

    /// Registration-time check: can `dependency` be satisfied without
    /// call-specific arguments?
    pub(crate) fn can_satisfy(
        &self,
        registry: &Registry,
        model: &ComponentModel,
        dependency: &DependencyModel,
    ) -> bool {
        if dependency.is_optional() || dependency.has_default() {
            return true;
        }
        if find_override(model.overrides(), dependency).is_some() {
            return true;
        }
        let request = DependencyRequest {
            model,
            dependency,
            context: None,
        };
        if self.sub_resolvers().iter().any(|s| s.can_resolve(&request)) {
            return true;
        }
        match dependency.referenced_component() {
            Some(name) => registry
                .handler_by_name(name)
                .map_or(false, |h| h.state() == HandlerState::Valid),
            None => registry.has_valid_provider(dependency.target()),
        }
    }

    /// Declared dependencies that currently block `model`.
    pub(crate) fn missing_dependencies(&self, registry: &Registry, model: &ComponentModel) -> Vec<DependencyModel> {
        model
            .dependencies()
            .iter()
            .filter(|d| !self.can_satisfy(registry, model, d))
            .cloned()
            .collect()
    }

    /// Resolve-time check for a handler still waiting on dependencies: can
    /// this particular call satisfy them?
    pub(crate) fn check_dynamic(&self, kernel: &KernelInner, ctx: &CreationContext, model: &ComponentModel) -> DiResult<()> {
        let arguments = ctx.arguments();
        let parent = ctx.parent_handler();
        let subs = self.sub_resolvers();
        for dependency in model.dependencies() {
            if dependency.is_optional() || dependency.has_default() {
                continue;
            }
            if arguments.lookup(dependency).is_some()
                || find_override(model.overrides(), dependency).is_some()
                || parent
                    .as_ref()
                    .map_or(false, |p| p.can_resolve_override(dependency))
            {
                continue;
            }
            let request = DependencyRequest {
                model,
                dependency,
                context: Some(ctx),
            };
            if subs.iter().any(|s| s.can_resolve(&request)) {
                continue;
            }
            let registered = match dependency.referenced_component() {
                Some(name) => kernel.handler_by_name(name).is_some(),
                None => kernel.has_provider(dependency.target()),
            };
            if !registered {
                return Err(unsatisfied(model, dependency));
            }
        }
        Ok(())
    }
}

fn find_override<'a>(overrides: &'a [DependencyOverride], dependency: &DependencyModel) -> Option<&'a DependencyOverride> {
    overrides.iter().find(|o| o.matches(dependency))
}

fn cycle_path(ctx: &CreationContext, handler: &Handler) -> Vec<String> {
    let mut chain = ctx.resolution_chain();
    chain.push(handler.model().name().to_string());
    chain
}

fn resolve_nested(ctx: &CreationContext, handler: &Arc<Handler>) -> DiResult<Instance> {
    if ctx.is_in_resolution_context(handler) {
        return Err(DiError::Circular(cycle_path(ctx, handler)));
    }
    handler.resolve(ctx)
}

fn unsatisfied(model: &ComponentModel, dependency: &DependencyModel) -> DiError {
    DiError::UnsatisfiedDependency {
        component: model.name().to_string(),
        dependency: dependency.key().to_string(),
        service: dependency.target().display_name(),
    }
}
