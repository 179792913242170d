//! Error types for the dependency injection kernel.

use thiserror::Error;

/// Dependency injection errors
///
/// Represents the various error conditions that can occur during component
/// registration, resolution, or release. Every variant propagates to the
/// original caller of `resolve`; none are swallowed by the kernel.
///
/// # Examples
///
/// ```rust
/// use ferrous_kernel::{DiError, Kernel, Resolver};
///
/// let kernel = Kernel::new();
/// match kernel.get::<String>() {
///     Err(DiError::NotFound(service)) => {
///         assert_eq!(service, "alloc::string::String");
///     }
///     _ => unreachable!(),
/// }
/// ```
///
/// ```rust
/// use ferrous_kernel::DiError;
///
/// let circular = DiError::Circular(vec!["a".into(), "b".into(), "a".into()]);
/// assert_eq!(circular.to_string(), "Circular dependency: a -> b -> a");
/// ```
#[derive(Debug, Clone, Error)]
pub enum DiError {
    /// No handler is registered for the requested service or name
    #[error("Service not found: {0}")]
    NotFound(String),

    /// Resolved instance could not be downcast to the requested type
    #[error("Type mismatch for: {0}")]
    TypeMismatch(String),

    /// A required dependency had no override, no handler and no default
    #[error(
        "Can't create component '{component}': dependency '{dependency}' of type {service} could not be satisfied"
    )]
    UnsatisfiedDependency {
        component: String,
        dependency: String,
        service: String,
    },

    /// Resolution would require the component to resolve itself (includes path)
    #[error("Circular dependency: {}", .0.join(" -> "))]
    Circular(Vec<String>),

    /// Closed service supplies fewer type arguments than the open implementation needs
    #[error(
        "Requested type {service} has {provided} generic parameter(s), but implementation {implementation} of component '{component}' requires {required}"
    )]
    GenericArityMismatch {
        component: String,
        service: String,
        implementation: String,
        provided: usize,
        required: usize,
    },

    /// Burden-graph operation used outside its contract (programmer error)
    #[error("Invalid lifecycle usage: {0}")]
    InvalidLifecycle(String),

    /// Scoped or bound component resolved with no applicable scope open
    #[error("Component '{component}' has a {lifestyle} lifestyle but no scope is available: {explanation}")]
    MissingScope {
        component: String,
        lifestyle: &'static str,
        explanation: String,
    },

    /// Registration rejected (duplicate name, no services, ...)
    #[error("Registration error: {0}")]
    Registration(String),

    /// Maximum resolution depth exceeded
    #[error("Max depth {0} exceeded")]
    DepthExceeded(usize),

    /// Resolution attempted after the kernel or lifestyle manager was disposed
    #[error("'{0}' has been disposed")]
    Disposed(String),

    /// Kernel options could not be loaded
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A factory or activator reported a failure
    #[error("Activation of '{component}' failed: {message}")]
    Activation { component: String, message: String },
}

impl DiError {
    /// Builds an activation failure for the given component.
    pub fn activation(component: impl Into<String>, message: impl Into<String>) -> Self {
        DiError::Activation {
            component: component.into(),
            message: message.into(),
        }
    }

    /// True for errors that mean "this chain cannot be satisfied right now".
    ///
    /// `try_resolve` turns these into an absent result instead of failing.
    pub fn is_unsatisfied(&self) -> bool {
        matches!(self, DiError::UnsatisfiedDependency { .. })
    }
}

/// Result type for DI operations
///
/// A convenience type alias for `Result<T, DiError>` used throughout the crate.
pub type DiResult<T> = Result<T, DiError>;
