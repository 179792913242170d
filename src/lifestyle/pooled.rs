use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{create_instance, LifestyleManager};
use crate::activator::ComponentActivator;
use crate::burden::Burden;
use crate::context::{Arguments, CreationContext};
use crate::descriptors::ComponentModel;
use crate::error::{DiError, DiResult};
use crate::key::{Instance, InstanceKey};
use crate::lifetime::PoolSettings;
use crate::registration::FastMap;
use crate::release_policy::ReleasePolicy;

struct PoolEntry {
    instance: Instance,
    /// Owns the instance's dependencies for as long as it stays pooled
    owner: Arc<Burden>,
    overflow: bool,
}

#[derive(Default)]
struct PoolState {
    available: Vec<PoolEntry>,
    in_use: FastMap<InstanceKey, PoolEntry>,
    /// Pooled instances alive or reserved, overflow excluded
    pooled: usize,
    warmed: bool,
    disposed: bool,
}

enum Borrow {
    Reuse(PoolEntry),
    Create { overflow: bool },
}

/// Instances borrowed from a bounded pool.
///
/// The first borrow warms the pool up to `initial_size`. Borrowing while the
/// pool is empty creates a new instance, pooled while fewer than `max_size`
/// exist and an overflow instance otherwise. Releasing a borrowed instance
/// runs the recycle hooks and puts it back; overflow instances are destroyed.
///
/// Each borrow is tracked in the release policy through a loan burden, so the
/// instance goes back to the pool when the caller (or the caller's parent)
/// is released.
pub struct PooledLifestyleManager {
    model: Arc<ComponentModel>,
    activator: Arc<dyn ComponentActivator>,
    settings: PoolSettings,
    state: Mutex<PoolState>,
}

impl PooledLifestyleManager {
    pub fn new(model: Arc<ComponentModel>, activator: Arc<dyn ComponentActivator>, settings: PoolSettings) -> Self {
        Self {
            model,
            activator,
            settings,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn available(&self) -> usize {
        self.state.lock().available.len()
    }

    pub fn in_use(&self) -> usize {
        self.state.lock().in_use.len()
    }

    fn new_entry(&self, ctx: &CreationContext, overflow: bool) -> DiResult<PoolEntry> {
        let owner = create_instance(ctx, &self.activator, true)?;
        let instance = owner
            .instance()
            .ok_or_else(|| DiError::InvalidLifecycle(format!("'{}' produced no instance", self.model.name())))?;
        Ok(PoolEntry {
            instance,
            owner,
            overflow,
        })
    }

    /// Creates an instance in a fresh context so it is not attributed to the caller.
    fn warm_entry(&self, ctx: &CreationContext) -> DiResult<PoolEntry> {
        let handler = ctx
            .current_handler()
            .ok_or_else(|| DiError::InvalidLifecycle("pool warm-up outside a resolution".into()))?;
        let warm = CreationContext::new(ctx.kernel().clone(), None, Arguments::new(), ctx.release_policy().clone());
        let _frame = warm.enter_resolution_context(handler)?;
        self.new_entry(&warm, false)
    }

    fn unreserve(&self, slots: usize) {
        let mut state = self.state.lock();
        state.pooled = state.pooled.saturating_sub(slots);
    }
}

impl LifestyleManager for PooledLifestyleManager {
    fn resolve(&self, ctx: &CreationContext, policy: &ReleasePolicy) -> DiResult<Instance> {
        let (borrow, warm_up) = {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(DiError::Disposed(format!("pool of '{}'", self.model.name())));
            }
            let borrow = match state.available.pop() {
                Some(entry) => Borrow::Reuse(entry),
                None if state.pooled < self.settings.max_size => {
                    state.pooled += 1;
                    Borrow::Create { overflow: false }
                }
                None => Borrow::Create { overflow: true },
            };
            let mut warm_up = 0;
            if !state.warmed {
                state.warmed = true;
                let room = self.settings.max_size.saturating_sub(state.pooled);
                warm_up = self.settings.initial_size.saturating_sub(state.pooled).min(room);
                state.pooled += warm_up;
            }
            (borrow, warm_up)
        };

        let entry = match borrow {
            Borrow::Reuse(entry) => entry,
            Borrow::Create { overflow } => match self.new_entry(ctx, overflow) {
                Ok(entry) => {
                    if overflow {
                        debug!(component = %self.model.name(), "pool exhausted, creating overflow instance");
                    }
                    entry
                }
                Err(err) => {
                    self.unreserve(warm_up + usize::from(!overflow));
                    return Err(err);
                }
            },
        };

        let instance = entry.instance.clone();
        let loan = match ctx.attach_existing_burden(instance.clone()) {
            Ok(loan) => loan,
            Err(err) => {
                self.state.lock().available.push(entry);
                self.unreserve(warm_up);
                return Err(err);
            }
        };
        loan.require_decommission();
        self.state.lock().in_use.insert(InstanceKey::of(&instance), entry);
        if let Err(err) = policy.track(&instance, loan.clone()) {
            // Returns the entry to the pool and leaves the frame's burden empty.
            loan.release();
            self.unreserve(warm_up);
            return Err(err);
        }

        for _ in 0..warm_up {
            match self.warm_entry(ctx) {
                Ok(entry) => self.state.lock().available.push(entry),
                Err(err) => {
                    warn!(component = %self.model.name(), error = %err, "pool warm-up failed");
                    self.unreserve(1);
                }
            }
        }
        Ok(instance)
    }

    fn release(&self, instance: &Instance) -> bool {
        let entry = self.state.lock().in_use.remove(&InstanceKey::of(instance));
        let Some(entry) = entry else {
            // Not on loan: the owner burden is tearing the instance down.
            self.activator.destroy(instance);
            return true;
        };

        if !entry.overflow {
            for hook in &self.model.lifecycle.recycle {
                hook(&entry.instance);
            }
            let mut state = self.state.lock();
            if !state.disposed {
                state.available.push(entry);
                return true;
            }
        }
        entry.owner.release();
        true
    }

    fn dispose(&self) {
        let available = {
            let mut state = self.state.lock();
            state.disposed = true;
            std::mem::take(&mut state.available)
        };
        for entry in available.into_iter().rev() {
            entry.owner.release();
        }
    }
}
