use std::marker::PhantomData;
use std::sync::Arc;

use crate::scope::{call_context, LifetimeScope};

/// Call-context scope opened by [`Kernel::begin_scope`](crate::Kernel::begin_scope).
///
/// While the guard lives, scoped components resolved on this thread share
/// the scope's instances. Dropping the guard closes the scope and releases
/// them in reverse creation order. Guards nest; the innermost wins.
///
/// The guard is `!Send`: it marks a region of the current thread's call flow.
/// To carry a scope into a future use `Kernel::create_scope` with
/// `within_scope`.
#[must_use = "the scope closes as soon as the guard is dropped"]
pub struct ScopeGuard {
    scope: Arc<LifetimeScope>,
    _not_send: PhantomData<*const ()>,
}

impl ScopeGuard {
    pub(crate) fn begin(scope: Arc<LifetimeScope>) -> Self {
        call_context::push(scope.clone());
        Self {
            scope,
            _not_send: PhantomData,
        }
    }

    pub fn scope(&self) -> &Arc<LifetimeScope> {
        &self.scope
    }

    /// Closes the scope now.
    pub fn dispose(self) {}
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        call_context::pop(&self.scope);
        self.scope.dispose();
    }
}
