//! # ferrous-kernel
//!
//! Dependency injection kernel built around component models, lifestyles and
//! burden-tracked release.
//!
//! ## Features
//!
//! - **Component models**: services, dependencies, overrides and extended
//!   properties described once and finalized at registration
//! - **Lifestyles**: transient, singleton, per-thread, pooled, scoped, bound
//!   and custom managers
//! - **Burdens**: every instance records what was resolved for it, so
//!   releasing a root releases its whole graph in reverse order
//! - **Release policies**: instances with decommission steps stay tracked
//!   until released, and are released newest-first on dispose
//! - **Handler states**: components with missing dependencies register as
//!   waiting and become valid once their dependencies arrive
//! - **Cycle detection**: resolution chains are reported when a component
//!   depends on itself through any path
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_kernel::{ComponentModel, DependencyModel, Kernel, Lifestyle, Resolver};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let kernel = Kernel::new();
//! kernel.register(
//!     ComponentModel::builder("database")
//!         .service::<Database>()
//!         .lifestyle(Lifestyle::Singleton)
//!         .factory(|_| Ok(Database { url: "postgres://localhost".to_string() }))
//!         .build(),
//! ).unwrap();
//! kernel.register(
//!     ComponentModel::builder("users")
//!         .service::<UserService>()
//!         .depends_on(DependencyModel::of::<Database>("db"))
//!         .factory(|ctx| Ok(UserService { db: ctx.dependency::<Database>("db")? }))
//!         .build(),
//! ).unwrap();
//!
//! let users = kernel.get_required::<UserService>();
//! assert_eq!(users.db.url, "postgres://localhost");
//! ```
//!
//! ## Scopes
//!
//! ```rust
//! use ferrous_kernel::{ComponentModel, Kernel, Lifestyle, Resolver};
//! use std::sync::Arc;
//!
//! struct RequestId(u32);
//!
//! let kernel = Kernel::new();
//! kernel.register(
//!     ComponentModel::builder("request-id")
//!         .service::<RequestId>()
//!         .lifestyle(Lifestyle::scoped())
//!         .factory(|_| Ok(RequestId(7)))
//!         .build(),
//! ).unwrap();
//!
//! // Scoped components need an open scope.
//! assert!(kernel.get::<RequestId>().is_err());
//!
//! let scope = kernel.begin_scope();
//! let a = kernel.get_required::<RequestId>();
//! let b = kernel.get_required::<RequestId>();
//! assert!(Arc::ptr_eq(&a, &b));
//! drop(scope);
//! ```

pub mod activator;
pub mod burden;
pub mod config;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod handler;
pub mod key;
pub mod lifestyle;
pub mod lifetime;
pub mod observer;
pub mod release_policy;
pub mod resolver;
pub mod scope;
pub mod traits;

mod internal;
mod kernel;
mod registration;

pub use activator::{ComponentActivator, FactoryActivator, FactoryContext};
pub use burden::Burden;
pub use config::KernelOptions;
pub use context::{Arguments, CreationContext, ResolutionGuard};
pub use descriptors::{
    ComponentModel, ComponentModelBuilder, DependencyId, DependencyKind, DependencyModel, DependencyOverride,
    ExtendedProperties, Implementation, ModelContributor, OverrideTarget, OverrideValue,
};
pub use error::{DiError, DiResult};
pub use handler::{GenericHandler, Handler, HandlerState};
pub use kernel::{Kernel, ScopeGuard};
pub use key::{ComponentName, GenericDefinition, Instance, InstanceKey, ServiceType};
pub use lifestyle::{
    LifestyleManager, LifestyleManagerFactory, PooledLifestyleManager, ScopedLifestyleManager,
    SingletonLifestyleManager, TransientLifestyleManager,
};
pub use lifetime::{Lifestyle, LifestyleKind, PoolSettings, ScopeRootSelector};
pub use observer::{KernelObserver, TrackedComponentsDiagnostic, TracingObserver};
pub use release_policy::{ReleasePolicy, TrackedInstance, TrackedSnapshot};
pub use resolver::{DependencyRequest, SubDependencyResolver};
pub use scope::{BoundScopeAccessor, CallContextScopeAccessor, LifetimeScope, ScopeAccessor, ThreadScopeAccessor};
pub use traits::{Dispose, Recyclable, Resolver, ResolverCore};

#[cfg(feature = "async")]
pub use scope::within_scope;
