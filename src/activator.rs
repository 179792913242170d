//! Instance creation and destruction.

use std::any::Any;
use std::sync::Arc;

use crate::burden::Burden;
use crate::context::CreationContext;
use crate::descriptors::ComponentModel;
use crate::error::{DiError, DiResult};
use crate::key::{ComponentName, Instance, ServiceType};
use crate::traits::ResolverCore;

/// Creates and destroys instances of one component.
pub trait ComponentActivator: Send + Sync {
    /// Builds a new instance. `burden` is the instance's burden, already
    /// current on `ctx`, with no instance set yet.
    fn create(&self, ctx: &CreationContext, burden: &Arc<Burden>) -> DiResult<Instance>;

    /// Runs the component's decommission steps on `instance`.
    fn destroy(&self, instance: &Instance);

    /// Instances need [`destroy`](Self::destroy) to be called.
    fn requires_decommission(&self) -> bool;
}

struct ResolvedDependency {
    key: ComponentName,
    value: Option<Instance>,
}

/// Default activator: resolves every declared dependency in order, then
/// calls the component's factory.
pub struct FactoryActivator {
    model: Arc<ComponentModel>,
}

impl FactoryActivator {
    pub fn new(model: Arc<ComponentModel>) -> Self {
        Self { model }
    }
}

impl ComponentActivator for FactoryActivator {
    fn create(&self, ctx: &CreationContext, burden: &Arc<Burden>) -> DiResult<Instance> {
        let factory = self.model.implementation.factory.as_ref().ok_or_else(|| {
            DiError::activation(self.model.name().as_str(), "no factory registered")
        })?;

        let mut resolved = Vec::with_capacity(self.model.dependencies().len());
        for dependency in self.model.dependencies() {
            resolved.push(ResolvedDependency {
                key: dependency.key().clone(),
                value: ctx.resolve_dependency(&self.model, dependency)?,
            });
        }

        let factory_ctx = FactoryContext {
            ctx,
            model: &self.model,
            burden,
            resolved: &resolved,
        };
        factory(&factory_ctx)
    }

    fn destroy(&self, instance: &Instance) {
        for hook in &self.model.lifecycle.decommission {
            hook(instance);
        }
    }

    fn requires_decommission(&self) -> bool {
        self.model.requires_decommission()
    }
}

/// What a factory sees while building an instance.
///
/// Gives access to the component's resolved dependencies and, through
/// [`ResolverCore`], to ad-hoc resolution that shares the caller's creation
/// context, so cycles through a factory are still detected.
pub struct FactoryContext<'a> {
    ctx: &'a CreationContext,
    model: &'a ComponentModel,
    burden: &'a Arc<Burden>,
    resolved: &'a [ResolvedDependency],
}

impl<'a> FactoryContext<'a> {
    fn lookup(&self, key: &str) -> DiResult<Option<&Instance>> {
        let key = ComponentName::new(key);
        self.resolved
            .iter()
            .find(|r| r.key == key)
            .map(|r| r.value.as_ref())
            .ok_or_else(|| {
                DiError::NotFound(format!("dependency '{}' is not declared by '{}'", key, self.model.name()))
            })
    }

    fn missing(&self, key: &str) -> DiError {
        DiError::NotFound(format!("dependency '{}' of '{}' was not supplied", key, self.model.name()))
    }

    /// Resolved value of a declared dependency.
    pub fn dependency<T: Any + Send + Sync>(&self, key: &str) -> DiResult<Arc<T>> {
        self.optional_dependency::<T>(key)?
            .ok_or_else(|| self.missing(key))
    }

    /// Resolved value of a declared dependency, `None` when an optional one was not supplied.
    pub fn optional_dependency<T: Any + Send + Sync>(&self, key: &str) -> DiResult<Option<Arc<T>>> {
        match self.lookup(key)? {
            Some(value) => value
                .clone()
                .downcast::<T>()
                .map(Some)
                .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>().to_string())),
            None => Ok(None),
        }
    }

    /// Resolved trait-object dependency, stored as `Arc<Arc<T>>`.
    pub fn dependency_trait<T: ?Sized + Send + Sync + 'static>(&self, key: &str) -> DiResult<Arc<T>> {
        let value = self.lookup(key)?.ok_or_else(|| self.missing(key))?;
        value
            .clone()
            .downcast::<Arc<T>>()
            .map(|inner| (*inner).clone())
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>().to_string()))
    }

    /// Type-erased value of a declared dependency.
    pub fn dependency_instance(&self, key: &str) -> DiResult<Option<Instance>> {
        Ok(self.lookup(key)?.cloned())
    }

    /// Type arguments a closed generic component was built for.
    pub fn type_arguments(&self) -> &[ServiceType] {
        self.model.type_arguments()
    }

    pub fn model(&self) -> &ComponentModel {
        self.model
    }

    /// Burden of the instance being built.
    pub fn burden(&self) -> &Arc<Burden> {
        self.burden
    }

    pub fn creation_context(&self) -> &CreationContext {
        self.ctx
    }
}

impl ResolverCore for FactoryContext<'_> {
    fn resolve_any(&self, service: &ServiceType) -> DiResult<Instance> {
        self.ctx.kernel().resolve_in(self.ctx, service)
    }

    fn resolve_named_any(&self, name: &ComponentName) -> DiResult<Instance> {
        self.ctx.kernel().resolve_named_in(self.ctx, name)
    }

    fn resolve_all_any(&self, service: &ServiceType) -> DiResult<Vec<Instance>> {
        self.ctx.kernel().resolve_all_in(self.ctx, service)
    }

    fn try_resolve_any(&self, service: &ServiceType) -> DiResult<Option<Instance>> {
        self.ctx.kernel().try_resolve_in(self.ctx, service)
    }
}
