//! Re-entrancy detection for shared instance construction.
//!
//! Creation contexts catch cycles inside one resolution. A factory that
//! resolves through the kernel directly starts a fresh context, so a
//! singleton waiting on its own construction would go unnoticed and block
//! forever. This thread-local stack catches that case.

use std::cell::RefCell;

use crate::error::{DiError, DiResult};

thread_local! {
    static CONSTRUCTION_TLS: RefCell<Vec<(usize, String)>> = RefCell::new(Vec::new());
}

/// Marks a shared instance as under construction on this thread.
pub(crate) struct ConstructionGuard {
    token: usize,
}

impl ConstructionGuard {
    /// Fails with the construction path when `token` is already being built here.
    pub(crate) fn enter(token: usize, name: &str) -> DiResult<Self> {
        CONSTRUCTION_TLS.with(|tls| {
            let mut stack = tls.borrow_mut();
            if stack.iter().any(|(t, _)| *t == token) {
                let mut path: Vec<String> = stack.iter().map(|(_, n)| n.clone()).collect();
                path.push(name.to_string());
                return Err(DiError::Circular(path));
            }
            stack.push((token, name.to_string()));
            Ok(Self { token })
        })
    }
}

impl Drop for ConstructionGuard {
    fn drop(&mut self) {
        CONSTRUCTION_TLS.with(|tls| {
            let mut stack = tls.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|(t, _)| *t == self.token) {
                stack.remove(pos);
            }
        });
    }
}
