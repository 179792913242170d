//! Hooks for observing kernel activity.
//!
//! Observers see registrations, handler state changes and top-level
//! resolutions. [`TracingObserver`] forwards them to `tracing`; custom
//! observers can collect metrics or audit trails.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::descriptors::ComponentModel;
use crate::error::DiError;
use crate::handler::HandlerState;
use crate::key::{ComponentName, ServiceType};
use crate::release_policy::TrackedSnapshot;

/// Observer for kernel events.
///
/// Calls are made synchronously on the resolving thread; keep
/// implementations cheap. Every method has an empty default.
///
/// # Examples
///
/// ```rust
/// use ferrous_kernel::{ComponentModel, Kernel, KernelObserver, Resolver, ServiceType};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct Counter(AtomicUsize);
/// impl KernelObserver for Counter {
///     fn resolved(&self, _service: &ServiceType, _elapsed: Duration) {
///         self.0.fetch_add(1, Ordering::SeqCst);
///     }
/// }
///
/// let counter = Arc::new(Counter::default());
/// let kernel = Kernel::new();
/// kernel.add_observer(counter.clone());
/// kernel.register(
///     ComponentModel::builder("n").service::<u8>().factory(|_| Ok(1u8)).build(),
/// ).unwrap();
///
/// kernel.get_required::<u8>();
/// assert_eq!(counter.0.load(Ordering::SeqCst), 1);
/// ```
pub trait KernelObserver: Send + Sync {
    fn registered(&self, _model: &ComponentModel, _state: HandlerState) {}

    /// A waiting handler became valid after another registration.
    fn handler_state_changed(&self, _component: &ComponentName, _state: HandlerState) {}

    fn resolving(&self, _service: &ServiceType) {}

    fn resolved(&self, _service: &ServiceType, _elapsed: Duration) {}

    fn resolution_failed(&self, _service: &ServiceType, _error: &DiError) {}
}

/// Receives tracked-instance snapshots from a release policy.
pub trait TrackedComponentsDiagnostic: Send + Sync {
    fn collect(&self, snapshot: &TrackedSnapshot);
}

impl<F> TrackedComponentsDiagnostic for F
where
    F: Fn(&TrackedSnapshot) + Send + Sync,
{
    fn collect(&self, snapshot: &TrackedSnapshot) {
        self(snapshot)
    }
}

#[derive(Default, Clone)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn KernelObserver>>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Arc<dyn KernelObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    pub(crate) fn registered(&self, model: &ComponentModel, state: HandlerState) {
        for observer in &self.observers {
            observer.registered(model, state);
        }
    }

    pub(crate) fn handler_state_changed(&self, component: &ComponentName, state: HandlerState) {
        for observer in &self.observers {
            observer.handler_state_changed(component, state);
        }
    }

    pub(crate) fn resolving(&self, service: &ServiceType) {
        for observer in &self.observers {
            observer.resolving(service);
        }
    }

    pub(crate) fn resolved(&self, service: &ServiceType, elapsed: Duration) {
        for observer in &self.observers {
            observer.resolved(service, elapsed);
        }
    }

    pub(crate) fn resolution_failed(&self, service: &ServiceType, error: &DiError) {
        for observer in &self.observers {
            observer.resolution_failed(service, error);
        }
    }
}

/// Observer that emits `tracing` events.
///
/// Registrations and state changes log at `info`, resolutions at `debug`,
/// failures at `warn`, all under the `ferrous_kernel` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    pub fn new() -> Self {
        Self
    }
}

impl KernelObserver for TracingObserver {
    fn registered(&self, model: &ComponentModel, state: HandlerState) {
        info!(
            target: "ferrous_kernel",
            component = %model.name(),
            lifestyle = %model.lifestyle().kind(),
            ?state,
            "component registered"
        );
    }

    fn handler_state_changed(&self, component: &ComponentName, state: HandlerState) {
        info!(target: "ferrous_kernel", %component, ?state, "handler state changed");
    }

    fn resolving(&self, service: &ServiceType) {
        debug!(target: "ferrous_kernel", %service, "resolving");
    }

    fn resolved(&self, service: &ServiceType, elapsed: Duration) {
        debug!(target: "ferrous_kernel", %service, ?elapsed, "resolved");
    }

    fn resolution_failed(&self, service: &ServiceType, error: &DiError) {
        warn!(target: "ferrous_kernel", %service, %error, "resolution failed");
    }
}
