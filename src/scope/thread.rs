//! One scope per OS thread.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use super::{LifetimeScope, ScopeAccessor};
use crate::context::CreationContext;
use crate::error::DiResult;

#[derive(Default)]
struct ThreadScopes {
    scopes: Vec<(ThreadId, Arc<LifetimeScope>)>,
}

/// Hands every thread its own [`LifetimeScope`], created on first use.
///
/// Scopes are not tied to thread exit: a thread's scope stays registered
/// until that thread calls [`end_current_thread`](Self::end_current_thread)
/// or the accessor is disposed, which releases the remaining scopes in reverse
/// creation order. Long-lived containers fed by short-lived threads should
/// end each thread's scope before the thread finishes.
#[derive(Default)]
pub struct ThreadScopeAccessor {
    state: Mutex<ThreadScopes>,
}

impl ThreadScopeAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope_count(&self) -> usize {
        self.state.lock().scopes.len()
    }

    /// Disposes the calling thread's scope and forgets it. The next
    /// resolution on this thread starts a fresh scope.
    ///
    /// Returns `false` when the thread had no scope.
    pub fn end_current_thread(&self) -> bool {
        let current = thread::current().id();
        let scope = {
            let mut state = self.state.lock();
            let Some(index) = state.scopes.iter().position(|(id, _)| *id == current) else {
                return false;
            };
            state.scopes.remove(index).1
        };
        scope.dispose();
        true
    }
}

impl ScopeAccessor for ThreadScopeAccessor {
    fn get_scope(&self, _ctx: &CreationContext) -> DiResult<Option<Arc<LifetimeScope>>> {
        let current = thread::current().id();
        let mut state = self.state.lock();
        // Scopes disposed by their owner are dropped here.
        state.scopes.retain(|(_, scope)| !scope.is_disposed());
        if let Some((_, scope)) = state.scopes.iter().find(|(id, _)| *id == current) {
            return Ok(Some(scope.clone()));
        }
        let scope = LifetimeScope::new();
        state.scopes.push((current, scope.clone()));
        Ok(Some(scope))
    }

    fn dispose(&self) {
        let scopes = std::mem::take(&mut self.state.lock().scopes);
        for (_, scope) in scopes.into_iter().rev() {
            scope.dispose();
        }
    }
}
