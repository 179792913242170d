//! Service and component identity types.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Type-erased instance produced by the kernel.
///
/// Trait objects are stored as `Arc<Arc<dyn Trait>>` so they survive the
/// round-trip through `Any`.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Contract identity a component can satisfy.
///
/// A service is either a Rust type (compared by `TypeId`, the hot path) or a
/// nominal contract that may be closed over type arguments. Nominal contracts
/// let callers describe generic services at runtime, which Rust's own
/// generics cannot express once type-erased.
///
/// # Examples
///
/// ```rust
/// use ferrous_kernel::{ServiceType, GenericDefinition};
///
/// let text = ServiceType::of::<String>();
/// assert_eq!(text.display_name(), "alloc::string::String");
///
/// let repo = ServiceType::generic("Repository", vec![ServiceType::of::<u32>()]);
/// assert!(repo.is_generic());
/// assert_eq!(repo.definition(), Some(GenericDefinition::new("Repository", 1)));
/// assert_eq!(repo.display_name(), "Repository<u32>");
/// ```
#[derive(Clone)]
pub struct ServiceType {
    repr: TypeRepr,
    args: Arc<[ServiceType]>,
}

#[derive(Clone)]
enum TypeRepr {
    Rust(TypeId, &'static str),
    Contract(Arc<str>),
}

impl ServiceType {
    /// Service identity of a concrete Rust type or trait object.
    #[inline(always)]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            repr: TypeRepr::Rust(TypeId::of::<T>(), std::any::type_name::<T>()),
            args: Arc::from(Vec::new()),
        }
    }

    /// Nominal, non-generic contract.
    pub fn contract(name: impl Into<Arc<str>>) -> Self {
        Self {
            repr: TypeRepr::Contract(name.into()),
            args: Arc::from(Vec::new()),
        }
    }

    /// Nominal contract closed over the given type arguments.
    pub fn generic(name: impl Into<Arc<str>>, args: Vec<ServiceType>) -> Self {
        Self {
            repr: TypeRepr::Contract(name.into()),
            args: Arc::from(args),
        }
    }

    /// Base name without type arguments.
    pub fn base_name(&self) -> &str {
        match &self.repr {
            TypeRepr::Rust(_, name) => name,
            TypeRepr::Contract(name) => name,
        }
    }

    /// Human-readable name including type arguments.
    pub fn display_name(&self) -> String {
        if self.args.is_empty() {
            return self.base_name().to_string();
        }
        let args: Vec<String> = self.args.iter().map(|a| a.display_name()).collect();
        format!("{}<{}>", self.base_name(), args.join(", "))
    }

    /// Type arguments of a closed generic contract.
    pub fn type_arguments(&self) -> &[ServiceType] {
        &self.args
    }

    pub fn is_generic(&self) -> bool {
        !self.args.is_empty()
    }

    /// Open definition this closed contract instantiates, if generic.
    pub fn definition(&self) -> Option<GenericDefinition> {
        match &self.repr {
            TypeRepr::Contract(name) if !self.args.is_empty() => {
                Some(GenericDefinition::new(name.clone(), self.args.len()))
            }
            _ => None,
        }
    }

    pub fn type_id(&self) -> Option<TypeId> {
        match &self.repr {
            TypeRepr::Rust(id, _) => Some(*id),
            TypeRepr::Contract(_) => None,
        }
    }
}

impl PartialEq for ServiceType {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        match (&self.repr, &other.repr) {
            // Hot path: TypeId comparison only (ignore string)
            (TypeRepr::Rust(a, _), TypeRepr::Rust(b, _)) => a == b,
            (TypeRepr::Contract(a), TypeRepr::Contract(b)) => a == b && self.args == other.args,
            _ => false,
        }
    }
}

impl Eq for ServiceType {}

impl Hash for ServiceType {
    #[inline(always)]
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.repr {
            TypeRepr::Rust(id, _) => {
                0u8.hash(state);
                id.hash(state);
            }
            TypeRepr::Contract(name) => {
                1u8.hash(state);
                name.hash(state);
                self.args.len().hash(state);
                for arg in self.args.iter() {
                    arg.hash(state);
                }
            }
        }
    }
}

impl fmt::Debug for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceType({})", self.display_name())
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Open generic contract, e.g. `Repository<>` with arity 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericDefinition {
    name: Arc<str>,
    arity: usize,
}

impl GenericDefinition {
    pub fn new(name: impl Into<Arc<str>>, arity: usize) -> Self {
        Self { name: name.into(), arity }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// True when `service` is a closed instantiation of this definition.
    pub fn matches(&self, service: &ServiceType) -> bool {
        service.definition().as_ref() == Some(self)
    }

    /// Closes the definition over `args`.
    pub fn close(&self, args: Vec<ServiceType>) -> ServiceType {
        ServiceType::generic(self.name.clone(), args)
    }
}

impl fmt::Display for GenericDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.name, ",".repeat(self.arity.saturating_sub(1)))
    }
}

/// Case-insensitive component name.
///
/// Keeps the original spelling for display while comparing and hashing on the
/// lower-cased form.
///
/// ```rust
/// use ferrous_kernel::ComponentName;
///
/// assert_eq!(ComponentName::new("UserRepository"), ComponentName::new("userrepository"));
/// assert_eq!(ComponentName::new("UserRepository").as_str(), "UserRepository");
/// ```
#[derive(Clone)]
pub struct ComponentName {
    display: Arc<str>,
    folded: Arc<str>,
}

impl ComponentName {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let display: Arc<str> = name.into();
        let folded: Arc<str> = Arc::from(display.to_lowercase());
        Self { display, folded }
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }

    pub fn is_empty(&self) -> bool {
        self.display.trim().is_empty()
    }
}

impl PartialEq for ComponentName {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for ComponentName {}

impl Hash for ComponentName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl fmt::Debug for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.display)
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl From<&str> for ComponentName {
    fn from(value: &str) -> Self {
        ComponentName::new(value)
    }
}

impl From<String> for ComponentName {
    fn from(value: String) -> Self {
        ComponentName::new(value)
    }
}

/// Reference identity of a live instance.
///
/// Two instances collide only when they are the same allocation, so value-like
/// or proxy types with custom equality never alias each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey(usize);

impl InstanceKey {
    #[inline]
    pub fn of(instance: &Instance) -> Self {
        Self::of_arc(instance)
    }

    /// Identity of a typed handle; matches [`of`](Self::of) for the same allocation.
    #[inline]
    pub fn of_arc<T: ?Sized>(instance: &Arc<T>) -> Self {
        InstanceKey(Arc::as_ptr(instance) as *const () as usize)
    }
}
