//! Burden: bookkeeping for one produced instance and the instances it owns.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::activator::ComponentActivator;
use crate::error::{DiError, DiResult};
use crate::handler::Handler;
use crate::key::{ComponentName, Instance};
use crate::lifetime::LifestyleKind;
use crate::scope::LifetimeScope;

type ReleasedCallback = Box<dyn FnOnce(&Burden) + Send>;

#[derive(Default)]
struct BurdenState {
    instance: Option<Instance>,
    children: Vec<Arc<Burden>>,
    stash: Option<Arc<LifetimeScope>>,
    released: bool,
    on_released: Vec<ReleasedCallback>,
}

/// Tracks one created instance and its ownership of child instances.
///
/// A burden is created the moment an instance is materialized, attached to
/// the burden of its resolution parent when the nested resolution unwinds,
/// and released exactly once. Releasing hands the instance back to the
/// lifestyle manager that produced it (destroy, or return to a pool), then
/// releases its children newest-first, disposes any bound-scope stash and
/// finally fires the `Released` notification.
pub struct Burden {
    id: u64,
    component: ComponentName,
    lifestyle: LifestyleKind,
    handler: Weak<Handler>,
    activator: Arc<dyn ComponentActivator>,
    tracked_externally: bool,
    requires_decommission: AtomicBool,
    has_parent: AtomicBool,
    releasing: AtomicBool,
    state: Mutex<BurdenState>,
}

impl Burden {
    pub(crate) fn new(
        handler: &Arc<Handler>,
        activator: Arc<dyn ComponentActivator>,
        tracked_externally: bool,
    ) -> Arc<Self> {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let model = handler.model();
        Arc::new(Self {
            id: NEXT.fetch_add(1, Ordering::Relaxed),
            component: model.name().clone(),
            lifestyle: model.lifestyle().kind(),
            handler: Arc::downgrade(handler),
            requires_decommission: AtomicBool::new(activator.requires_decommission()),
            activator,
            tracked_externally,
            has_parent: AtomicBool::new(false),
            releasing: AtomicBool::new(false),
            state: Mutex::new(BurdenState::default()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn component(&self) -> &ComponentName {
        &self.component
    }

    pub fn lifestyle(&self) -> LifestyleKind {
        self.lifestyle
    }

    pub fn instance(&self) -> Option<Instance> {
        self.state.lock().instance.clone()
    }

    pub(crate) fn set_instance(&self, instance: Instance) -> DiResult<()> {
        let mut state = self.state.lock();
        if state.instance.is_some() {
            return Err(DiError::InvalidLifecycle(format!(
                "burden of '{}' already holds an instance",
                self.component
            )));
        }
        state.instance = Some(instance);
        Ok(())
    }

    /// Instance must receive an explicit destroy callback.
    pub fn requires_decommission(&self) -> bool {
        self.requires_decommission.load(Ordering::Acquire)
    }

    /// Raise the decommission requirement; it never drops back.
    pub fn require_decommission(&self) {
        self.requires_decommission.store(true, Ordering::Release);
    }

    pub fn tracked_externally(&self) -> bool {
        self.tracked_externally
    }

    /// Must be registered with a release policy to ever be released.
    pub fn requires_policy_release(&self) -> bool {
        !self.tracked_externally && self.requires_decommission()
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    /// Release has started; the instance may already be back with its manager.
    pub(crate) fn is_releasing(&self) -> bool {
        self.releasing.load(Ordering::Acquire)
    }

    pub fn children_count(&self) -> usize {
        self.state.lock().children.len()
    }

    /// Attaches `child` so it is released together with this burden.
    ///
    /// A child needing decommission makes this burden need it too.
    pub fn add_child(&self, child: Arc<Burden>) -> DiResult<()> {
        if child.has_parent.swap(true, Ordering::AcqRel) {
            return Err(DiError::InvalidLifecycle(format!(
                "burden of '{}' is already attached to a parent",
                child.component
            )));
        }
        if child.requires_decommission() {
            self.require_decommission();
        }
        let mut state = self.state.lock();
        if state.released {
            drop(state);
            child.release();
            return Ok(());
        }
        state.children.push(child);
        Ok(())
    }

    /// Registers a callback fired after this burden is released.
    ///
    /// Fires immediately when the burden is already released.
    pub fn on_released<F>(&self, callback: F)
    where
        F: FnOnce(&Burden) + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.released {
            drop(state);
            callback(self);
            return;
        }
        state.on_released.push(Box::new(callback));
    }

    /// Lifetime scope stored on this burden, created on first use.
    pub(crate) fn scope_stash(self: &Arc<Self>) -> Arc<LifetimeScope> {
        let mut state = self.state.lock();
        state
            .stash
            .get_or_insert_with(|| LifetimeScope::stash_for(Arc::downgrade(self)))
            .clone()
    }

    /// Releases the instance and, transitively, its children.
    ///
    /// Returns `false` when the burden was already released or the lifestyle
    /// manager refused to let the instance go.
    pub fn release(&self) -> bool {
        if self.releasing.swap(true, Ordering::AcqRel) {
            return false;
        }

        let instance = self.state.lock().instance.clone();
        if let Some(instance) = &instance {
            let accepted = match self.handler.upgrade() {
                Some(handler) => handler.release_instance(instance),
                None => {
                    self.activator.destroy(instance);
                    true
                }
            };
            if !accepted {
                trace!(component = %self.component, "lifestyle manager kept instance");
                self.releasing.store(false, Ordering::Release);
                return false;
            }
        }

        let (children, stash, callbacks) = {
            let mut state = self.state.lock();
            state.released = true;
            state.instance = None;
            (
                std::mem::take(&mut state.children),
                state.stash.take(),
                std::mem::take(&mut state.on_released),
            )
        };

        trace!(
            component = %self.component,
            burden = self.id,
            children = children.len(),
            "releasing burden"
        );

        for child in children.into_iter().rev() {
            child.release();
        }
        if let Some(stash) = stash {
            stash.dispose();
        }
        for callback in callbacks {
            callback(self);
        }
        true
    }
}

impl Drop for Burden {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.released && state.instance.is_some() && self.requires_policy_release() {
            warn!(component = %self.component, "burden dropped without being released");
        }
    }
}

impl fmt::Debug for Burden {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Burden")
            .field("id", &self.id)
            .field("component", &self.component)
            .field("lifestyle", &self.lifestyle)
            .field("requires_decommission", &self.requires_decommission())
            .field("tracked_externally", &self.tracked_externally)
            .finish()
    }
}
