//! Component descriptions consumed by the kernel.
//!
//! A [`ComponentModel`] is built once, optionally adjusted by contributors, and
//! frozen into an `Arc` when the kernel registers it. After that it is
//! read-only and safe for concurrent reads.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::activator::{ComponentActivator, FactoryContext};
use crate::error::{DiError, DiResult};
use crate::key::{ComponentName, GenericDefinition, Instance, ServiceType};
use crate::lifetime::Lifestyle;
use crate::traits::{Dispose, Recyclable};

/// Extended property set when an instance needs an explicit destroy callback.
pub const REQUIRES_DECOMMISSION: &str = "requires-decommission";

pub(crate) type ErasedFactory =
    Arc<dyn for<'a> Fn(&FactoryContext<'a>) -> DiResult<Instance> + Send + Sync>;
pub(crate) type InstanceHook = Arc<dyn Fn(&Instance) + Send + Sync>;
pub(crate) type ActivatorOverride =
    Arc<dyn Fn(Arc<ComponentModel>) -> Arc<dyn ComponentActivator> + Send + Sync>;

/// Mutates a model before the kernel freezes it.
///
/// Metadata extraction lives outside the kernel; contributors are the hook
/// through which it lands on the model.
pub trait ModelContributor: Send + Sync {
    fn contribute(&self, model: &mut ComponentModel);
}

impl<F> ModelContributor for F
where
    F: Fn(&mut ComponentModel) + Send + Sync,
{
    fn contribute(&self, model: &mut ComponentModel) {
        self(model)
    }
}

/// Process-unique identity of a declared dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DependencyId(u64);

impl DependencyId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        DependencyId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Whether a dependency is a constructor parameter or a settable member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Constructor,
    Property,
}

/// One declared dependency of a component.
///
/// # Examples
///
/// ```rust
/// use ferrous_kernel::{DependencyModel, DependencyKind};
///
/// let port = DependencyModel::of::<u16>("port").with_default(8080u16);
/// assert!(port.has_default());
///
/// let logger = DependencyModel::of::<String>("logger").property();
/// assert_eq!(logger.kind(), DependencyKind::Property);
/// assert!(logger.is_optional());
/// ```
#[derive(Clone)]
pub struct DependencyModel {
    id: DependencyId,
    key: ComponentName,
    target: ServiceType,
    kind: DependencyKind,
    optional: bool,
    default: Option<Instance>,
    reference: Option<ComponentName>,
}

impl DependencyModel {
    pub fn new(key: impl Into<ComponentName>, target: ServiceType) -> Self {
        Self {
            id: DependencyId::next(),
            key: key.into(),
            target,
            kind: DependencyKind::Constructor,
            optional: false,
            default: None,
            reference: None,
        }
    }

    /// Constructor dependency on the Rust type `T`.
    pub fn of<T: ?Sized + 'static>(key: impl Into<ComponentName>) -> Self {
        Self::new(key, ServiceType::of::<T>())
    }

    /// Settable member; optional unless marked [`required`](Self::required).
    pub fn property(mut self) -> Self {
        self.kind = DependencyKind::Property;
        self.optional = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.optional = false;
        self
    }

    pub fn with_default<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.default = Some(Arc::new(value));
        self
    }

    /// Resolve this dependency from the named component only.
    pub fn reference(mut self, component: impl Into<ComponentName>) -> Self {
        self.reference = Some(component.into());
        self
    }

    pub fn id(&self) -> DependencyId {
        self.id
    }

    pub fn key(&self) -> &ComponentName {
        &self.key
    }

    pub fn target(&self) -> &ServiceType {
        &self.target
    }

    pub fn kind(&self) -> DependencyKind {
        self.kind
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn default_value(&self) -> Option<&Instance> {
        self.default.as_ref()
    }

    pub fn referenced_component(&self) -> Option<&ComponentName> {
        self.reference.as_ref()
    }
}

impl fmt::Debug for DependencyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyModel")
            .field("key", &self.key)
            .field("target", &self.target)
            .field("kind", &self.kind)
            .field("optional", &self.optional)
            .field("has_default", &self.default.is_some())
            .field("reference", &self.reference)
            .finish()
    }
}

/// What a dependency override applies to.
#[derive(Debug, Clone)]
pub enum OverrideTarget {
    /// Dependency name, case-insensitive
    Key(ComponentName),
    /// Dependency target type
    Type(ServiceType),
    /// One specific declared dependency, by reference identity
    Dependency(DependencyId),
}

/// What an override supplies.
#[derive(Clone)]
pub enum OverrideValue {
    /// A fixed instance
    Value(Instance),
    /// The named component, resolved through the kernel
    Component(ComponentName),
}

impl fmt::Debug for OverrideValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverrideValue::Value(_) => f.write_str("Value(..)"),
            OverrideValue::Component(name) => write!(f, "Component({})", name),
        }
    }
}

/// Per-component dependency override declared at registration.
///
/// Overrides on the component being built win over the registry; overrides on
/// its parent in the resolution path apply to the nested component as well.
#[derive(Debug, Clone)]
pub struct DependencyOverride {
    pub target: OverrideTarget,
    pub value: OverrideValue,
}

impl DependencyOverride {
    pub fn on_key<T: Any + Send + Sync>(key: impl Into<ComponentName>, value: T) -> Self {
        Self {
            target: OverrideTarget::Key(key.into()),
            value: OverrideValue::Value(Arc::new(value)),
        }
    }

    pub fn on_type<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            target: OverrideTarget::Type(ServiceType::of::<T>()),
            value: OverrideValue::Value(Arc::new(value)),
        }
    }

    pub fn on_dependency<T: Any + Send + Sync>(dependency: &DependencyModel, value: T) -> Self {
        Self {
            target: OverrideTarget::Dependency(dependency.id()),
            value: OverrideValue::Value(Arc::new(value)),
        }
    }

    /// Satisfy the keyed dependency with a specific named component.
    pub fn service_override(key: impl Into<ComponentName>, component: impl Into<ComponentName>) -> Self {
        Self {
            target: OverrideTarget::Key(key.into()),
            value: OverrideValue::Component(component.into()),
        }
    }

    pub fn matches(&self, dependency: &DependencyModel) -> bool {
        match &self.target {
            OverrideTarget::Key(key) => key == dependency.key(),
            OverrideTarget::Type(service) => service == dependency.target(),
            OverrideTarget::Dependency(id) => *id == dependency.id(),
        }
    }
}

/// Open, string-keyed bag of auxiliary metadata.
#[derive(Clone, Default)]
pub struct ExtendedProperties {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ExtendedProperties {
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Reads a boolean flag, `false` when absent or of another type.
    pub fn flag(&self, key: &str) -> bool {
        self.get::<bool>(key).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ExtendedProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Concrete implementation backing a component.
#[derive(Clone)]
pub struct Implementation {
    pub(crate) name: Arc<str>,
    pub(crate) generic_parameters: usize,
    pub(crate) factory: Option<ErasedFactory>,
    pub(crate) activator: Option<ActivatorOverride>,
}

impl Implementation {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type parameters an open-generic implementation needs closed.
    pub fn generic_parameters(&self) -> usize {
        self.generic_parameters
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("name", &self.name)
            .field("generic_parameters", &self.generic_parameters)
            .field("custom_activator", &self.activator.is_some())
            .finish()
    }
}

/// Decommission and recycle steps run on instances.
#[derive(Clone, Default)]
pub(crate) struct LifecycleSteps {
    pub(crate) decommission: Vec<InstanceHook>,
    pub(crate) recycle: Vec<InstanceHook>,
}

/// Immutable-after-build description of one registerable unit.
///
/// # Examples
///
/// ```rust
/// use ferrous_kernel::{ComponentModel, DependencyModel, Kernel, Lifestyle, Resolver};
/// use std::sync::Arc;
///
/// struct Config { url: String }
/// struct Repository { config: Arc<Config> }
///
/// let kernel = Kernel::new();
/// kernel.register(
///     ComponentModel::builder("config")
///         .service::<Config>()
///         .lifestyle(Lifestyle::Singleton)
///         .factory(|_| Ok(Config { url: "postgres://localhost".into() }))
///         .build(),
/// ).unwrap();
/// kernel.register(
///     ComponentModel::builder("repository")
///         .service::<Repository>()
///         .depends_on(DependencyModel::of::<Config>("config"))
///         .factory(|ctx| Ok(Repository { config: ctx.dependency::<Config>("config")? }))
///         .build(),
/// ).unwrap();
///
/// let repo = kernel.get_required::<Repository>();
/// assert_eq!(repo.config.url, "postgres://localhost");
/// ```
#[derive(Clone)]
pub struct ComponentModel {
    pub(crate) name: ComponentName,
    pub(crate) services: Vec<ServiceType>,
    pub(crate) open_services: Vec<GenericDefinition>,
    pub(crate) implementation: Implementation,
    pub(crate) lifestyle: Lifestyle,
    pub(crate) dependencies: Vec<DependencyModel>,
    pub(crate) overrides: Vec<DependencyOverride>,
    pub(crate) extended_properties: ExtendedProperties,
    pub(crate) type_arguments: Vec<ServiceType>,
    pub(crate) lifecycle: LifecycleSteps,
    pub(crate) contributors: Vec<Arc<dyn ModelContributor>>,
}

impl ComponentModel {
    pub fn builder(name: impl Into<ComponentName>) -> ComponentModelBuilder {
        ComponentModelBuilder::new(name.into())
    }

    /// Builder named after `T` and exposing `T` as its service.
    pub fn builder_for<T: 'static>() -> ComponentModelBuilder {
        ComponentModelBuilder::new(ComponentName::new(std::any::type_name::<T>())).service::<T>()
    }

    pub fn name(&self) -> &ComponentName {
        &self.name
    }

    pub fn services(&self) -> &[ServiceType] {
        &self.services
    }

    pub fn open_services(&self) -> &[GenericDefinition] {
        &self.open_services
    }

    pub fn is_open_generic(&self) -> bool {
        !self.open_services.is_empty()
    }

    pub fn implementation(&self) -> &Implementation {
        &self.implementation
    }

    pub fn lifestyle(&self) -> &Lifestyle {
        &self.lifestyle
    }

    /// Constructor dependencies first, then properties, each in declaration order.
    pub fn dependencies(&self) -> &[DependencyModel] {
        &self.dependencies
    }

    pub fn overrides(&self) -> &[DependencyOverride] {
        &self.overrides
    }

    pub fn extended_properties(&self) -> &ExtendedProperties {
        &self.extended_properties
    }

    pub fn extended_properties_mut(&mut self) -> &mut ExtendedProperties {
        &mut self.extended_properties
    }

    pub fn type_arguments(&self) -> &[ServiceType] {
        &self.type_arguments
    }

    pub fn provides(&self, service: &ServiceType) -> bool {
        self.services.contains(service) || self.open_services.iter().any(|d| d.matches(service))
    }

    pub fn requires_decommission(&self) -> bool {
        self.extended_properties.flag(REQUIRES_DECOMMISSION) || !self.lifecycle.decommission.is_empty()
    }

    pub fn add_dependency(&mut self, dependency: DependencyModel) {
        self.dependencies.push(dependency);
    }

    pub fn add_override(&mut self, dependency_override: DependencyOverride) {
        self.overrides.push(dependency_override);
    }

    pub fn set_lifestyle(&mut self, lifestyle: Lifestyle) {
        self.lifestyle = lifestyle;
    }

    /// Runs contributors, orders dependencies and checks invariants.
    pub(crate) fn finalize(mut self, contributors: &[Arc<dyn ModelContributor>]) -> DiResult<Self> {
        let own = std::mem::take(&mut self.contributors);
        for contributor in contributors.iter().chain(own.iter()) {
            contributor.contribute(&mut self);
        }

        if self.name.is_empty() {
            return Err(DiError::Registration("component name must not be empty".into()));
        }
        if self.services.is_empty() && self.open_services.is_empty() {
            return Err(DiError::Registration(format!(
                "component '{}' does not expose any service",
                self.name
            )));
        }
        if !self.services.is_empty() && !self.open_services.is_empty() {
            return Err(DiError::Registration(format!(
                "component '{}' mixes open generic and closed services",
                self.name
            )));
        }
        if self.implementation.factory.is_none() && self.implementation.activator.is_none() {
            return Err(DiError::Registration(format!(
                "component '{}' has no factory or activator",
                self.name
            )));
        }

        // Stable sort keeps declaration order within each kind.
        self.dependencies
            .sort_by_key(|d| matches!(d.kind(), DependencyKind::Property));
        Ok(self)
    }

    /// Closes an open-generic model over the requested service.
    pub(crate) fn close_over(&self, service: &ServiceType) -> DiResult<ComponentModel> {
        let provided = service.type_arguments().len();
        let required = self.implementation.generic_parameters;
        if required > provided {
            return Err(DiError::GenericArityMismatch {
                component: self.name.to_string(),
                service: service.display_name(),
                implementation: self.implementation.name.to_string(),
                provided,
                required,
            });
        }

        let mut closed = self.clone();
        closed.name = ComponentName::new(format!("{}[{}]", self.name, service.display_name()));
        closed.services = vec![service.clone()];
        closed.open_services = Vec::new();
        closed.type_arguments = service.type_arguments()[..required].to_vec();
        Ok(closed)
    }
}

impl fmt::Debug for ComponentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentModel")
            .field("name", &self.name)
            .field("services", &self.services)
            .field("open_services", &self.open_services)
            .field("implementation", &self.implementation)
            .field("lifestyle", &self.lifestyle)
            .field("dependencies", &self.dependencies)
            .field("extended_properties", &self.extended_properties)
            .finish()
    }
}

/// Fluent construction of a [`ComponentModel`].
pub struct ComponentModelBuilder {
    model: ComponentModel,
}

impl ComponentModelBuilder {
    fn new(name: ComponentName) -> Self {
        Self {
            model: ComponentModel {
                implementation: Implementation {
                    name: Arc::from(name.as_str()),
                    generic_parameters: 0,
                    factory: None,
                    activator: None,
                },
                name,
                services: Vec::new(),
                open_services: Vec::new(),
                lifestyle: Lifestyle::Transient,
                dependencies: Vec::new(),
                overrides: Vec::new(),
                extended_properties: ExtendedProperties::default(),
                type_arguments: Vec::new(),
                lifecycle: LifecycleSteps::default(),
                contributors: Vec::new(),
            },
        }
    }

    pub fn service<T: ?Sized + 'static>(self) -> Self {
        self.service_type(ServiceType::of::<T>())
    }

    pub fn service_type(mut self, service: ServiceType) -> Self {
        if !self.model.services.contains(&service) {
            self.model.services.push(service);
        }
        self
    }

    pub fn open_service(mut self, definition: GenericDefinition) -> Self {
        if !self.model.open_services.contains(&definition) {
            self.model.open_services.push(definition);
        }
        self
    }

    pub fn implementation_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.model.implementation.name = name.into();
        self
    }

    pub fn generic_parameters(mut self, count: usize) -> Self {
        self.model.implementation.generic_parameters = count;
        self
    }

    pub fn lifestyle(mut self, lifestyle: Lifestyle) -> Self {
        self.model.lifestyle = lifestyle;
        self
    }

    pub fn depends_on(mut self, dependency: DependencyModel) -> Self {
        self.model.dependencies.push(dependency);
        self
    }

    pub fn override_dependency(mut self, dependency_override: DependencyOverride) -> Self {
        self.model.overrides.push(dependency_override);
        self
    }

    pub fn extended_property<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.model.extended_properties.insert(key, value);
        self
    }

    /// Factory producing a concrete `T`.
    pub fn factory<T, F>(mut self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: for<'a> Fn(&FactoryContext<'a>) -> DiResult<T> + Send + Sync + 'static,
    {
        self.model.implementation.factory = Some(Arc::new(move |ctx: &FactoryContext<'_>| {
            factory(ctx).map(|value| Arc::new(value) as Instance)
        }));
        self
    }

    /// Factory producing a trait object, stored as `Arc<Arc<T>>`.
    pub fn trait_factory<T, F>(mut self, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: for<'a> Fn(&FactoryContext<'a>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        self.model.implementation.factory = Some(Arc::new(move |ctx: &FactoryContext<'_>| {
            factory(ctx).map(|value| Arc::new(value) as Instance)
        }));
        self
    }

    /// Factory producing an already type-erased instance.
    pub fn instance_factory<F>(mut self, factory: F) -> Self
    where
        F: for<'a> Fn(&FactoryContext<'a>) -> DiResult<Instance> + Send + Sync + 'static,
    {
        self.model.implementation.factory = Some(Arc::new(factory));
        self
    }

    /// Replaces the default factory activator.
    pub fn activator<F>(mut self, make: F) -> Self
    where
        F: Fn(Arc<ComponentModel>) -> Arc<dyn ComponentActivator> + Send + Sync + 'static,
    {
        self.model.implementation.activator = Some(Arc::new(make));
        self
    }

    /// Destroy callback for instances of `T`; marks the component as requiring decommission.
    pub fn on_destroy<T, F>(mut self, hook: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.model.lifecycle.decommission.push(Arc::new(move |instance: &Instance| {
            if let Some(value) = instance.downcast_ref::<T>() {
                hook(value);
            }
        }));
        self.model.extended_properties.insert(REQUIRES_DECOMMISSION, true);
        self
    }

    /// Calls [`Dispose::dispose`] when an instance is destroyed.
    pub fn disposable<T: Dispose>(self) -> Self {
        self.on_destroy(|value: &T| value.dispose())
    }

    /// Callback run each time a pooled instance goes back to its pool.
    pub fn on_recycle<T, F>(mut self, hook: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.model.lifecycle.recycle.push(Arc::new(move |instance: &Instance| {
            if let Some(value) = instance.downcast_ref::<T>() {
                hook(value);
            }
        }));
        self
    }

    /// Calls [`Recyclable::recycle`] when a pooled instance is returned.
    pub fn recyclable<T: Recyclable>(self) -> Self {
        self.on_recycle(|value: &T| value.recycle())
    }

    /// Per-registration contributor, run after kernel-wide contributors.
    pub fn contribute<F>(mut self, contributor: F) -> Self
    where
        F: Fn(&mut ComponentModel) + Send + Sync + 'static,
    {
        self.model.contributors.push(Arc::new(contributor));
        self
    }

    pub fn build(self) -> ComponentModel {
        self.model
    }
}
