//! Resolver traits for service resolution.

use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::key::{ComponentName, Instance, ServiceType};

/// Core resolver trait for object-safe service resolution.
///
/// Implemented by the [`Kernel`](crate::Kernel) for top-level calls and by
/// [`FactoryContext`](crate::FactoryContext) for ad-hoc resolution inside a
/// factory, where it shares the caller's creation context so cycles across the
/// whole graph stay detectable.
///
/// Most users should use the [`Resolver`] trait instead, which provides
/// ergonomic generic methods built on top of this trait.
pub trait ResolverCore {
    /// Resolves the default component for a service.
    fn resolve_any(&self, service: &ServiceType) -> DiResult<Instance>;

    /// Resolves a component by its (case-insensitive) name.
    fn resolve_named_any(&self, name: &ComponentName) -> DiResult<Instance>;

    /// Resolves every component exposing a service, in registration order.
    ///
    /// Components whose dependencies cannot currently be satisfied are skipped.
    fn resolve_all_any(&self, service: &ServiceType) -> DiResult<Vec<Instance>>;

    /// Resolves a service, returning `None` when it is not registered or its
    /// dependency chain cannot be satisfied.
    fn try_resolve_any(&self, service: &ServiceType) -> DiResult<Option<Instance>>;
}

fn downcast<T: 'static + Send + Sync>(any: Instance) -> DiResult<Arc<T>> {
    any.downcast::<T>()
        .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>().to_string()))
}

fn downcast_trait<T: ?Sized + 'static + Send + Sync>(any: Instance) -> DiResult<Arc<T>> {
    // Trait objects are stored as Arc<Arc<dyn Trait>>
    any.downcast::<Arc<T>>()
        .map(|boxed| (*boxed).clone())
        .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>().to_string()))
}

/// High-level resolver interface with generic methods for type-safe resolution.
///
/// Blanket-implemented for every [`ResolverCore`].
///
/// # Examples
///
/// ```
/// use ferrous_kernel::{ComponentModel, Kernel, Lifestyle, Resolver};
/// use std::sync::Arc;
///
/// trait Logger: Send + Sync {
///     fn log(&self, msg: &str) -> String;
/// }
///
/// struct ConsoleLogger;
/// impl Logger for ConsoleLogger {
///     fn log(&self, msg: &str) -> String {
///         format!("LOG: {}", msg)
///     }
/// }
///
/// let kernel = Kernel::new();
/// kernel.register(
///     ComponentModel::builder("number")
///         .service::<usize>()
///         .lifestyle(Lifestyle::Singleton)
///         .factory(|_| Ok(42usize))
///         .build(),
/// ).unwrap();
/// kernel.register(
///     ComponentModel::builder("logger")
///         .service::<dyn Logger>()
///         .trait_factory::<dyn Logger, _>(|_| Ok(Arc::new(ConsoleLogger) as Arc<dyn Logger>))
///         .build(),
/// ).unwrap();
///
/// assert_eq!(*kernel.get_required::<usize>(), 42);
/// let logger = kernel.get_required_trait::<dyn Logger>();
/// assert_eq!(logger.log("hi"), "LOG: hi");
/// ```
pub trait Resolver: ResolverCore {
    /// Resolves a concrete service type.
    fn get<T: 'static + Send + Sync>(&self) -> DiResult<Arc<T>> {
        downcast(self.resolve_any(&ServiceType::of::<T>())?)
    }

    /// Resolves a concrete service type, `None` when unavailable.
    fn try_get<T: 'static + Send + Sync>(&self) -> DiResult<Option<Arc<T>>> {
        match self.try_resolve_any(&ServiceType::of::<T>())? {
            Some(any) => downcast(any).map(Some),
            None => Ok(None),
        }
    }

    /// Resolves a trait implementation registered through `trait_factory`.
    fn get_trait<T: ?Sized + 'static + Send + Sync>(&self) -> DiResult<Arc<T>> {
        downcast_trait(self.resolve_any(&ServiceType::of::<T>())?)
    }

    /// Resolves every registered implementation of a concrete service type.
    fn get_all<T: 'static + Send + Sync>(&self) -> DiResult<Vec<Arc<T>>> {
        self.resolve_all_any(&ServiceType::of::<T>())?
            .into_iter()
            .map(downcast)
            .collect()
    }

    /// Resolves every registered implementation of a trait.
    fn get_all_trait<T: ?Sized + 'static + Send + Sync>(&self) -> DiResult<Vec<Arc<T>>> {
        self.resolve_all_any(&ServiceType::of::<T>())?
            .into_iter()
            .map(downcast_trait)
            .collect()
    }

    /// Resolves a named component as a concrete type.
    fn get_named<T: 'static + Send + Sync>(&self, name: &str) -> DiResult<Arc<T>> {
        downcast(self.resolve_named_any(&ComponentName::new(name))?)
    }

    /// Resolves a named component as a trait object.
    fn get_named_trait<T: ?Sized + 'static + Send + Sync>(&self, name: &str) -> DiResult<Arc<T>> {
        downcast_trait(self.resolve_named_any(&ComponentName::new(name))?)
    }

    /// Resolves a concrete service, panicking on failure.
    ///
    /// # Panics
    ///
    /// Panics if the service cannot be resolved (not found, missing scope,
    /// circular dependency, etc.).
    fn get_required<T: 'static + Send + Sync>(&self) -> Arc<T> {
        self.get::<T>()
            .unwrap_or_else(|e| panic!("Failed to resolve {}: {}", std::any::type_name::<T>(), e))
    }

    /// Resolves a trait implementation, panicking on failure.
    fn get_required_trait<T: ?Sized + 'static + Send + Sync>(&self) -> Arc<T> {
        self.get_trait::<T>()
            .unwrap_or_else(|e| panic!("Failed to resolve {}: {}", std::any::type_name::<T>(), e))
    }

    /// Resolves a named component, panicking on failure.
    fn get_named_required<T: 'static + Send + Sync>(&self, name: &str) -> Arc<T> {
        self.get_named::<T>(name)
            .unwrap_or_else(|e| panic!("Failed to resolve {} '{}': {}", std::any::type_name::<T>(), name, e))
    }
}

impl<R: ResolverCore + ?Sized> Resolver for R {}
