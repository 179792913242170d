//! Per-resolution state: the stack of handlers being built, their burdens and
//! the inline arguments supplied by the caller.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::warn;

use crate::activator::ComponentActivator;
use crate::burden::Burden;
use crate::descriptors::{ComponentModel, DependencyModel};
use crate::error::{DiError, DiResult};
use crate::handler::Handler;
use crate::kernel::KernelInner;
use crate::key::{ComponentName, Instance, ServiceType};
use crate::registration::FastMap;
use crate::release_policy::ReleasePolicy;

/// Caller-supplied values that take precedence over every other source.
///
/// Looked up by dependency name first (case-insensitive), then by dependency
/// type. Arguments apply to the component being resolved; nested components
/// only see them when the set is [`propagating`](Self::propagating).
///
/// # Examples
///
/// ```rust
/// use ferrous_kernel::{Arguments, ComponentModel, DependencyModel, Kernel, ServiceType};
///
/// struct Greeter { name: String }
///
/// let kernel = Kernel::new();
/// kernel.register(
///     ComponentModel::builder("greeter")
///         .service::<Greeter>()
///         .depends_on(DependencyModel::of::<String>("name"))
///         .factory(|ctx| Ok(Greeter { name: (*ctx.dependency::<String>("name")?).clone() }))
///         .build(),
/// ).unwrap();
///
/// let args = Arguments::new().with_named("Name", "ada".to_string());
/// let greeter = kernel.resolve_with(&ServiceType::of::<Greeter>(), args).unwrap();
/// assert_eq!(greeter.downcast_ref::<Greeter>().unwrap().name, "ada");
/// ```
#[derive(Clone, Default)]
pub struct Arguments {
    named: FastMap<ComponentName, Instance>,
    typed: FastMap<ServiceType, Instance>,
    propagate: bool,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_named<T: Any + Send + Sync>(mut self, key: impl Into<ComponentName>, value: T) -> Self {
        self.named.insert(key.into(), Arc::new(value));
        self
    }

    pub fn with_typed<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.typed.insert(ServiceType::of::<T>(), Arc::new(value));
        self
    }

    /// Already type-erased value under a dependency name.
    pub fn with_instance(mut self, key: impl Into<ComponentName>, value: Instance) -> Self {
        self.named.insert(key.into(), value);
        self
    }

    /// Also apply these arguments to every nested resolution.
    pub fn propagating(mut self) -> Self {
        self.propagate = true;
        self
    }

    pub fn is_propagating(&self) -> bool {
        self.propagate
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.typed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.named.len() + self.typed.len()
    }

    pub fn lookup(&self, dependency: &DependencyModel) -> Option<Instance> {
        self.named
            .get(dependency.key())
            .or_else(|| self.typed.get(dependency.target()))
            .cloned()
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("named", &self.named.keys().collect::<Vec<_>>())
            .field("typed", &self.typed.keys().collect::<Vec<_>>())
            .field("propagate", &self.propagate)
            .finish()
    }
}

struct ResolutionFrame {
    handler: Arc<Handler>,
    burden: Option<Arc<Burden>>,
    arguments: Arc<Arguments>,
}

/// State of one top-level resolution.
///
/// Tracks the handlers currently being built (for cycle detection and bound
/// lifestyles), the burden of each, and the arguments that apply to each
/// frame. A context belongs to a single thread of execution; nested
/// resolutions reuse it, which is how cycles spanning the whole graph are
/// caught.
pub struct CreationContext {
    kernel: Arc<KernelInner>,
    policy: ReleasePolicy,
    requested: Option<ServiceType>,
    arguments: Arc<Arguments>,
    empty: Arc<Arguments>,
    frames: RefCell<SmallVec<[ResolutionFrame; 8]>>,
}

impl CreationContext {
    pub(crate) fn new(
        kernel: Arc<KernelInner>,
        requested: Option<ServiceType>,
        arguments: Arguments,
        policy: ReleasePolicy,
    ) -> Self {
        Self {
            kernel,
            policy,
            requested,
            arguments: Arc::new(arguments),
            empty: Arc::new(Arguments::new()),
            frames: RefCell::new(SmallVec::new()),
        }
    }

    pub(crate) fn kernel(&self) -> &Arc<KernelInner> {
        &self.kernel
    }

    /// Release policy tracking what this resolution creates.
    pub fn release_policy(&self) -> &ReleasePolicy {
        &self.policy
    }

    /// Service the top-level caller asked for.
    pub fn requested_service(&self) -> Option<&ServiceType> {
        self.requested.as_ref()
    }

    /// Pushes a frame for `handler`; the returned guard pops it.
    pub fn enter_resolution_context(&self, handler: Arc<Handler>) -> DiResult<ResolutionGuard<'_>> {
        let mut frames = self.frames.borrow_mut();
        let max_depth = self.kernel.options().max_resolution_depth;
        if frames.len() >= max_depth {
            return Err(DiError::DepthExceeded(frames.len()));
        }
        let arguments = match frames.last() {
            None => self.arguments.clone(),
            Some(parent)
                if parent.arguments.is_propagating()
                    || self.kernel.options().propagate_inline_arguments =>
            {
                parent.arguments.clone()
            }
            Some(_) => self.empty.clone(),
        };
        frames.push(ResolutionFrame {
            handler,
            burden: None,
            arguments,
        });
        Ok(ResolutionGuard {
            ctx: self,
            depth: frames.len(),
        })
    }

    /// True while `handler` is on the resolution stack.
    pub fn is_in_resolution_context(&self, handler: &Handler) -> bool {
        self.frames
            .borrow()
            .iter()
            .any(|f| std::ptr::eq(Arc::as_ptr(&f.handler), handler))
    }

    /// Component names on the stack, outermost first.
    pub fn resolution_chain(&self) -> Vec<String> {
        self.frames
            .borrow()
            .iter()
            .map(|f| f.handler.model().name().to_string())
            .collect()
    }

    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    pub fn current_handler(&self) -> Option<Arc<Handler>> {
        self.frames.borrow().last().map(|f| f.handler.clone())
    }

    /// Handler one level up from the current frame.
    pub fn parent_handler(&self) -> Option<Arc<Handler>> {
        let frames = self.frames.borrow();
        let len = frames.len();
        if len < 2 {
            return None;
        }
        Some(frames[len - 2].handler.clone())
    }

    /// Handlers below the current frame, outermost first.
    pub fn ancestor_handlers(&self) -> Vec<Arc<Handler>> {
        let frames = self.frames.borrow();
        let len = frames.len().saturating_sub(1);
        frames[..len].iter().map(|f| f.handler.clone()).collect()
    }

    /// Burden of the frame at `index`, outermost first.
    pub fn frame_burden(&self, index: usize) -> Option<Arc<Burden>> {
        self.frames.borrow().get(index).and_then(|f| f.burden.clone())
    }

    /// Arguments visible to the current frame.
    pub fn arguments(&self) -> Arc<Arguments> {
        match self.frames.borrow().last() {
            Some(frame) => frame.arguments.clone(),
            None => self.arguments.clone(),
        }
    }

    /// Creates the burden for the instance about to be built in the current frame.
    pub fn create_burden(
        &self,
        activator: Arc<dyn ComponentActivator>,
        tracked_externally: bool,
    ) -> DiResult<Arc<Burden>> {
        let mut frames = self.frames.borrow_mut();
        let frame = frames.last_mut().ok_or_else(|| outside_frame("create_burden"))?;
        let burden = Burden::new(&frame.handler, activator, tracked_externally);
        frame.burden = Some(burden.clone());
        Ok(burden)
    }

    /// Creates a burden for an instance that already exists and makes it the
    /// current frame's burden.
    pub fn attach_existing_burden(&self, instance: Instance) -> DiResult<Arc<Burden>> {
        let mut frames = self.frames.borrow_mut();
        let frame = frames
            .last_mut()
            .ok_or_else(|| outside_frame("attach_existing_burden"))?;
        let burden = Burden::new(&frame.handler, frame.handler.activator().clone(), false);
        burden.set_instance(instance)?;
        frame.burden = Some(burden.clone());
        Ok(burden)
    }

    /// Resolves one dependency of `model` through the kernel's resolver.
    ///
    /// Meant for custom activators; the factory activator does this for every
    /// declared dependency.
    pub fn resolve_dependency(
        &self,
        model: &ComponentModel,
        dependency: &DependencyModel,
    ) -> DiResult<Option<Instance>> {
        let parent = self.parent_handler();
        self.kernel
            .resolver()
            .resolve(&self.kernel, self, parent.as_deref(), model, dependency)
    }

    fn exit(&self, depth: usize) {
        let (popped, parent) = {
            let mut frames = self.frames.borrow_mut();
            debug_assert_eq!(frames.len(), depth);
            let popped = frames.pop();
            let parent = frames.last().and_then(|f| f.burden.clone());
            (popped, parent)
        };
        let Some(burden) = popped.and_then(|f| f.burden) else {
            return;
        };
        if burden.instance().is_none() || !burden.requires_policy_release() {
            return;
        }
        if let Some(parent) = parent {
            if let Err(err) = parent.add_child(burden) {
                warn!(error = %err, "could not attach burden to its parent");
            }
        }
    }
}

fn outside_frame(operation: &str) -> DiError {
    DiError::InvalidLifecycle(format!(
        "not in a resolution context: '{operation}' can only be called while a handler is being resolved"
    ))
}

impl fmt::Debug for CreationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreationContext")
            .field("requested", &self.requested)
            .field("chain", &self.resolution_chain())
            .finish()
    }
}

/// Pops its resolution frame on drop and attaches the frame's burden to the
/// parent frame's burden when it needs an explicit release.
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub struct ResolutionGuard<'a> {
    ctx: &'a CreationContext,
    depth: usize,
}

impl Drop for ResolutionGuard<'_> {
    fn drop(&mut self) {
        self.ctx.exit(self.depth);
    }
}
