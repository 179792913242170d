//! Lifetime scopes and the strategies that locate them.
//!
//! A [`LifetimeScope`] caches one burden per component and releases them in
//! reverse creation order when disposed. A [`ScopeAccessor`] decides which
//! scope applies to a given resolution: the calling thread's
//! ([`ThreadScopeAccessor`]), the innermost scope opened by the caller
//! ([`CallContextScopeAccessor`]), or a stash on an ancestor's burden
//! ([`BoundScopeAccessor`]).

mod bound;
pub(crate) mod call_context;
mod thread;

pub use bound::BoundScopeAccessor;
pub use call_context::CallContextScopeAccessor;
#[cfg(feature = "async")]
pub use call_context::within_scope;
pub use thread::ThreadScopeAccessor;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::burden::Burden;
use crate::context::CreationContext;
use crate::error::{DiError, DiResult};
use crate::key::ComponentName;
use crate::registration::FastMap;

/// Locates the lifetime scope for the component being resolved.
pub trait ScopeAccessor: Send + Sync {
    /// Scope for the current resolution, `None` when none applies.
    fn get_scope(&self, ctx: &CreationContext) -> DiResult<Option<Arc<LifetimeScope>>>;

    /// Explanation attached to the missing-scope error.
    fn missing_scope_explanation(&self) -> String {
        "no scope is active for this resolution".to_string()
    }

    /// Disposes scopes owned by the accessor itself.
    fn dispose(&self) {}
}

#[derive(Default)]
struct ScopeCache {
    by_component: FastMap<ComponentName, Arc<Burden>>,
    order: Vec<Arc<Burden>>,
}

/// Per-scope cache of component instances.
///
/// # Examples
///
/// ```rust
/// use ferrous_kernel::{ComponentModel, Kernel, Lifestyle, Resolver};
/// use std::sync::Arc;
///
/// struct UnitOfWork;
///
/// let kernel = Kernel::new();
/// kernel.register(
///     ComponentModel::builder("uow")
///         .service::<UnitOfWork>()
///         .lifestyle(Lifestyle::scoped())
///         .factory(|_| Ok(UnitOfWork))
///         .build(),
/// ).unwrap();
///
/// let scope = kernel.begin_scope();
/// let a = kernel.get_required::<UnitOfWork>();
/// let b = kernel.get_required::<UnitOfWork>();
/// assert!(Arc::ptr_eq(&a, &b));
/// assert_eq!(scope.scope().cached_count(), 1);
/// ```
pub struct LifetimeScope {
    id: u64,
    kernel_id: Option<u64>,
    owner: Option<Weak<Burden>>,
    cache: Mutex<ScopeCache>,
    disposed: AtomicBool,
}

impl LifetimeScope {
    fn build(kernel_id: Option<u64>, owner: Option<Weak<Burden>>) -> Arc<Self> {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Arc::new(Self {
            id: NEXT.fetch_add(1, Ordering::Relaxed),
            kernel_id,
            owner,
            cache: Mutex::new(ScopeCache::default()),
            disposed: AtomicBool::new(false),
        })
    }

    /// Free-standing scope, usable with any kernel.
    pub fn new() -> Arc<Self> {
        Self::build(None, None)
    }

    pub(crate) fn for_kernel(kernel_id: u64) -> Arc<Self> {
        Self::build(Some(kernel_id), None)
    }

    /// Scope stored on an ancestor's burden for bound components.
    pub(crate) fn stash_for(owner: Weak<Burden>) -> Arc<Self> {
        Self::build(None, Some(owner))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn belongs_to(&self, kernel_id: u64) -> bool {
        self.kernel_id.map_or(true, |id| id == kernel_id)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().order.len()
    }

    /// Cached burden for `component`, created by `create` on first request.
    ///
    /// Creation runs outside the cache lock. When two callers race, the first
    /// insert wins and the loser's burden is released.
    pub fn get_cached_instance<F>(&self, component: &ComponentName, create: F) -> DiResult<Arc<Burden>>
    where
        F: FnOnce() -> DiResult<Arc<Burden>>,
    {
        if self.is_disposed() {
            return Err(DiError::Disposed(format!("lifetime scope {}", self.id)));
        }
        if let Some(existing) = self.cache.lock().by_component.get(component) {
            return Ok(existing.clone());
        }

        let burden = create()?;
        if burden.requires_decommission() {
            if let Some(owner) = self.owner.as_ref().and_then(Weak::upgrade) {
                owner.require_decommission();
            }
        }

        let mut cache = self.cache.lock();
        if let Some(existing) = cache.by_component.get(component).cloned() {
            drop(cache);
            burden.release();
            return Ok(existing);
        }
        cache.by_component.insert(component.clone(), burden.clone());
        cache.order.push(burden.clone());
        Ok(burden)
    }

    /// Releases every cached burden in reverse creation order. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let order = {
            let mut cache = self.cache.lock();
            cache.by_component.clear();
            std::mem::take(&mut cache.order)
        };
        trace!(scope = self.id, count = order.len(), "disposing lifetime scope");
        for burden in order.into_iter().rev() {
            burden.release();
        }
    }
}

impl fmt::Debug for LifetimeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifetimeScope")
            .field("id", &self.id)
            .field("cached", &self.cached_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
