//! Component lifestyle definitions.

use std::fmt;
use std::sync::Arc;

use crate::handler::Handler;
use crate::key::ServiceType;
use crate::lifestyle::LifestyleManagerFactory;
use crate::scope::ScopeAccessor;

/// Enumerated lifestyle kind, without parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(any(feature = "config", feature = "diagnostics"), derive(serde::Serialize, serde::Deserialize))]
pub enum LifestyleKind {
    Transient,
    Singleton,
    PerThread,
    Pooled,
    Scoped,
    Bound,
    Custom,
}

impl LifestyleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifestyleKind::Transient => "transient",
            LifestyleKind::Singleton => "singleton",
            LifestyleKind::PerThread => "per-thread",
            LifestyleKind::Pooled => "pooled",
            LifestyleKind::Scoped => "scoped",
            LifestyleKind::Bound => "bound",
            LifestyleKind::Custom => "custom",
        }
    }
}

impl fmt::Display for LifestyleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pool bounds for the pooled lifestyle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolSettings {
    /// Instances the pool warms up to on first use
    pub initial_size: usize,
    /// Instances the pool keeps; borrowing beyond this creates overflow instances
    pub max_size: usize,
}

impl PoolSettings {
    pub fn new(initial_size: usize, max_size: usize) -> Self {
        Self {
            initial_size: initial_size.min(max_size),
            max_size,
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::new(5, 15)
    }
}

/// Chooses the ancestor a bound component attaches its instance to.
///
/// The selector sees the handlers of the current resolution path, outermost
/// first, excluding the bound component itself.
#[derive(Clone)]
pub enum ScopeRootSelector {
    /// Closest ancestor exposing the service
    Nearest(ServiceType),
    /// Outermost ancestor exposing the service
    Farthest(ServiceType),
    /// Caller-supplied selection returning the index of the chosen ancestor
    Custom(Arc<dyn Fn(&[Arc<Handler>]) -> Option<usize> + Send + Sync>),
}

impl ScopeRootSelector {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[Arc<Handler>]) -> Option<usize> + Send + Sync + 'static,
    {
        ScopeRootSelector::Custom(Arc::new(f))
    }

    pub(crate) fn select(&self, ancestors: &[Arc<Handler>]) -> Option<usize> {
        match self {
            ScopeRootSelector::Nearest(service) => ancestors
                .iter()
                .rposition(|h| h.model().provides(service)),
            ScopeRootSelector::Farthest(service) => ancestors
                .iter()
                .position(|h| h.model().provides(service)),
            ScopeRootSelector::Custom(f) => f(ancestors),
        }
    }
}

impl fmt::Debug for ScopeRootSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeRootSelector::Nearest(s) => write!(f, "Nearest({})", s),
            ScopeRootSelector::Farthest(s) => write!(f, "Farthest({})", s),
            ScopeRootSelector::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Lifestyle controlling how many instances of a component exist and when
/// they are created, reused and destroyed.
///
/// # Examples
///
/// ```rust
/// use ferrous_kernel::{ComponentModel, Kernel, Lifestyle, Resolver};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct RequestModel { id: u32 }
///
/// let kernel = Kernel::new();
/// kernel.register(
///     ComponentModel::builder("database")
///         .service::<Database>()
///         .lifestyle(Lifestyle::Singleton)
///         .factory(|_| Ok(Database { url: "postgres://localhost".into() }))
///         .build(),
/// ).unwrap();
/// kernel.register(
///     ComponentModel::builder("request")
///         .service::<RequestModel>()
///         .lifestyle(Lifestyle::Transient)
///         .factory(|_| Ok(RequestModel { id: 7 }))
///         .build(),
/// ).unwrap();
///
/// let a = kernel.get_required::<Database>();
/// let b = kernel.get_required::<Database>();
/// assert!(Arc::ptr_eq(&a, &b));
///
/// let x = kernel.get_required::<RequestModel>();
/// let y = kernel.get_required::<RequestModel>();
/// assert!(!Arc::ptr_eq(&x, &y));
/// ```
#[derive(Clone, Default)]
pub enum Lifestyle {
    /// New instance per resolution, never cached
    #[default]
    Transient,
    /// One instance per kernel, created on first resolution
    Singleton,
    /// One instance per OS thread
    PerThread,
    /// Instances borrowed from a bounded pool; `None` uses the kernel's default bounds
    Pooled(Option<PoolSettings>),
    /// One instance per scope; `None` uses the kernel's call-context scopes
    Scoped(Option<Arc<dyn ScopeAccessor>>),
    /// One instance per selected ancestor in the current resolution
    Bound(ScopeRootSelector),
    /// Caller-supplied lifestyle manager
    Custom(Arc<dyn LifestyleManagerFactory>),
}

impl Lifestyle {
    pub fn scoped() -> Self {
        Lifestyle::Scoped(None)
    }

    pub fn pooled(initial_size: usize, max_size: usize) -> Self {
        Lifestyle::Pooled(Some(PoolSettings::new(initial_size, max_size)))
    }

    /// Pooled with the bounds from `KernelOptions::default_pool`.
    pub fn pooled_default() -> Self {
        Lifestyle::Pooled(None)
    }

    pub fn bound_to(service: ServiceType) -> Self {
        Lifestyle::Bound(ScopeRootSelector::Nearest(service))
    }

    pub fn kind(&self) -> LifestyleKind {
        match self {
            Lifestyle::Transient => LifestyleKind::Transient,
            Lifestyle::Singleton => LifestyleKind::Singleton,
            Lifestyle::PerThread => LifestyleKind::PerThread,
            Lifestyle::Pooled(_) => LifestyleKind::Pooled,
            Lifestyle::Scoped(_) => LifestyleKind::Scoped,
            Lifestyle::Bound(_) => LifestyleKind::Bound,
            Lifestyle::Custom(_) => LifestyleKind::Custom,
        }
    }
}

impl fmt::Debug for Lifestyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifestyle::Pooled(Some(settings)) => write!(f, "Pooled({:?})", settings),
            Lifestyle::Bound(selector) => write!(f, "Bound({:?})", selector),
            other => f.write_str(other.kind().as_str()),
        }
    }
}
