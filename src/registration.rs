//! Handler registry: lookup tables by name, service and generic definition.

use std::sync::Arc;

use crate::handler::{GenericHandler, Handler, HandlerState};
use crate::key::{ComponentName, GenericDefinition, ServiceType};

#[cfg(feature = "ahash")]
pub(crate) type FastMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;
#[cfg(not(feature = "ahash"))]
pub(crate) type FastMap<K, V> = std::collections::HashMap<K, V>;

/// All handlers of one kernel.
///
/// Mutated only under the kernel's write lock. `defaults` is a read-through
/// cache of the handler chosen for a service and is cleared on every
/// registration.
#[derive(Default)]
pub(crate) struct Registry {
    by_name: FastMap<ComponentName, Arc<Handler>>,
    by_service: FastMap<ServiceType, Vec<Arc<Handler>>>,
    generic_by_name: FastMap<ComponentName, Arc<GenericHandler>>,
    generic: FastMap<GenericDefinition, Vec<Arc<GenericHandler>>>,
    /// Closed handlers keyed by (open component, closed service)
    closed: FastMap<(ComponentName, ServiceType), Arc<Handler>>,
    order: Vec<Arc<Handler>>,
    defaults: FastMap<ServiceType, Arc<Handler>>,
    /// Bumped by every registration; guards `defaults` against stale writes
    generation: u64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains_name(&self, name: &ComponentName) -> bool {
        self.by_name.contains_key(name) || self.generic_by_name.contains_key(name)
    }

    pub(crate) fn insert(&mut self, handler: Arc<Handler>) {
        let model = handler.model();
        self.by_name.insert(model.name().clone(), handler.clone());
        for service in model.services() {
            self.by_service
                .entry(service.clone())
                .or_default()
                .push(handler.clone());
        }
        self.order.push(handler);
        self.invalidate();
    }

    pub(crate) fn insert_generic(&mut self, handler: Arc<GenericHandler>) {
        let model = handler.model();
        self.generic_by_name.insert(model.name().clone(), handler.clone());
        for definition in model.open_services() {
            self.generic
                .entry(definition.clone())
                .or_default()
                .push(handler.clone());
        }
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.defaults.clear();
        self.generation += 1;
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Stores a handler closed from `open` for `service`.
    pub(crate) fn insert_closed(&mut self, open: &GenericHandler, service: &ServiceType, handler: Arc<Handler>) {
        self.closed
            .insert((open.model().name().clone(), service.clone()), handler.clone());
        self.by_name.insert(handler.model().name().clone(), handler.clone());
        self.order.push(handler);
    }

    pub(crate) fn closed(&self, open: &GenericHandler, service: &ServiceType) -> Option<Arc<Handler>> {
        self.closed
            .get(&(open.model().name().clone(), service.clone()))
            .cloned()
    }

    pub(crate) fn handler_by_name(&self, name: &ComponentName) -> Option<Arc<Handler>> {
        self.by_name.get(name).cloned()
    }

    /// Non-generic handlers for `service`, in registration order.
    pub(crate) fn handlers_for(&self, service: &ServiceType) -> Vec<Arc<Handler>> {
        self.by_service.get(service).cloned().unwrap_or_default()
    }

    /// Open-generic handlers able to close over `service`, in registration order.
    pub(crate) fn generic_handlers_for(&self, service: &ServiceType) -> Vec<Arc<GenericHandler>> {
        service
            .definition()
            .and_then(|definition| self.generic.get(&definition).cloned())
            .unwrap_or_default()
    }

    /// Any handler (in any state) or open generic for `service`.
    pub(crate) fn has_provider(&self, service: &ServiceType) -> bool {
        self.by_service.get(service).map_or(false, |h| !h.is_empty())
            || service
                .definition()
                .map_or(false, |definition| self.generic.contains_key(&definition))
    }

    /// A `Valid` handler or an open generic for `service`.
    pub(crate) fn has_valid_provider(&self, service: &ServiceType) -> bool {
        self.by_service
            .get(service)
            .map_or(false, |hs| hs.iter().any(|h| h.state() == HandlerState::Valid))
            || service
                .definition()
                .map_or(false, |definition| self.generic.contains_key(&definition))
    }

    pub(crate) fn cached_default(&self, service: &ServiceType) -> Option<Arc<Handler>> {
        self.defaults.get(service).cloned()
    }

    /// Caches the default handler unless a registration happened since `generation`.
    pub(crate) fn cache_default(&mut self, generation: u64, service: ServiceType, handler: Arc<Handler>) {
        if self.generation == generation {
            self.defaults.insert(service, handler);
        }
    }

    /// Every closed handler, in registration order.
    pub(crate) fn handlers(&self) -> &[Arc<Handler>] {
        &self.order
    }

    pub(crate) fn waiting(&self) -> Vec<Arc<Handler>> {
        self.order
            .iter()
            .filter(|h| h.state() == HandlerState::WaitingDependency)
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len() + self.generic_by_name.len()
    }
}
