//! Scopes that follow the logical call flow.
//!
//! Synchronous code opens scopes with `Kernel::begin_scope`, which pushes onto
//! a thread-local stack. Async code hands a scope to a future with
//! [`within_scope`] (feature `async`), which carries it across `.await`
//! points and worker threads. Thread-local scopes are always the innermost
//! ones, because the guard that owns them is `!Send` and cannot live across
//! an `.await` in a spawned task.

use std::cell::RefCell;
use std::sync::Arc;

use super::{LifetimeScope, ScopeAccessor};
use crate::context::CreationContext;
use crate::error::DiResult;

thread_local! {
    static SCOPE_STACK: RefCell<Vec<Arc<LifetimeScope>>> = RefCell::new(Vec::new());
}

#[cfg(feature = "async")]
tokio::task_local! {
    static TASK_SCOPE: Arc<LifetimeScope>;
}

pub(crate) fn push(scope: Arc<LifetimeScope>) {
    SCOPE_STACK.with(|stack| stack.borrow_mut().push(scope));
}

/// Removes `scope` from the current thread's stack, wherever it sits.
pub(crate) fn pop(scope: &Arc<LifetimeScope>) {
    SCOPE_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(pos) = stack.iter().rposition(|s| Arc::ptr_eq(s, scope)) {
            stack.remove(pos);
        }
    });
}

fn innermost(kernel_id: Option<u64>) -> Option<Arc<LifetimeScope>> {
    let accepts = |scope: &LifetimeScope| match kernel_id {
        Some(id) => scope.belongs_to(id),
        None => true,
    };

    let local = SCOPE_STACK.with(|stack| {
        stack
            .borrow()
            .iter()
            .rev()
            .find(|s| !s.is_disposed() && accepts(s))
            .cloned()
    });
    if local.is_some() {
        return local;
    }

    #[cfg(feature = "async")]
    {
        if let Ok(Some(scope)) = TASK_SCOPE.try_with(|s| {
            if !s.is_disposed() && accepts(s) {
                Some(s.clone())
            } else {
                None
            }
        }) {
            return Some(scope);
        }
    }
    None
}

/// Runs `future` with `scope` as its call-context scope.
///
/// ```rust
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use ferrous_kernel::{within_scope, ComponentModel, Kernel, Lifestyle, Resolver};
/// use std::sync::Arc;
///
/// struct Session;
///
/// let kernel = Kernel::new();
/// kernel.register(
///     ComponentModel::builder("session")
///         .service::<Session>()
///         .lifestyle(Lifestyle::scoped())
///         .factory(|_| Ok(Session))
///         .build(),
/// ).unwrap();
///
/// let scope = kernel.create_scope();
/// let (a, b) = within_scope(scope.clone(), async {
///     let a = kernel.get_required::<Session>();
///     tokio::task::yield_now().await;
///     (a, kernel.get_required::<Session>())
/// })
/// .await;
/// assert!(Arc::ptr_eq(&a, &b));
/// scope.dispose();
/// # }
/// ```
#[cfg(feature = "async")]
pub async fn within_scope<F>(scope: Arc<LifetimeScope>, future: F) -> F::Output
where
    F: std::future::Future,
{
    TASK_SCOPE.scope(scope, future).await
}

/// Resolves the innermost scope opened by the caller.
///
/// Bound to one kernel, it ignores scopes opened on other kernels.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallContextScopeAccessor {
    kernel_id: Option<u64>,
}

impl CallContextScopeAccessor {
    /// Accessor accepting scopes from any kernel.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn for_kernel(kernel_id: u64) -> Self {
        Self {
            kernel_id: Some(kernel_id),
        }
    }
}

impl ScopeAccessor for CallContextScopeAccessor {
    fn get_scope(&self, _ctx: &CreationContext) -> DiResult<Option<Arc<LifetimeScope>>> {
        Ok(innermost(self.kernel_id))
    }

    fn missing_scope_explanation(&self) -> String {
        "open one with `Kernel::begin_scope`, or run the caller inside `within_scope`".to_string()
    }
}
