//! Lifecycle traits for instance teardown and pooling.

/// Trait for synchronous resource disposal.
///
/// Register it with [`ComponentModelBuilder::disposable`](crate::ComponentModelBuilder::disposable)
/// and the kernel calls `dispose` exactly once when the instance's burden is
/// released, whether by an explicit `Kernel::release`, the end of a scope, or
/// kernel disposal.
///
/// # Examples
///
/// ```
/// use ferrous_kernel::{ComponentModel, Dispose, Kernel, Resolver};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// static FLUSHED: AtomicBool = AtomicBool::new(false);
///
/// struct Cache;
/// impl Dispose for Cache {
///     fn dispose(&self) {
///         FLUSHED.store(true, Ordering::SeqCst);
///     }
/// }
///
/// let kernel = Kernel::new();
/// kernel.register(
///     ComponentModel::builder("cache")
///         .service::<Cache>()
///         .factory(|_| Ok(Cache))
///         .disposable::<Cache>()
///         .build(),
/// ).unwrap();
///
/// let cache = kernel.get_required::<Cache>();
/// assert!(kernel.release_typed(&cache));
/// assert!(FLUSHED.load(Ordering::SeqCst));
/// ```
pub trait Dispose: Send + Sync + 'static {
    /// Perform synchronous cleanup of resources.
    fn dispose(&self);
}

/// Trait for pooled instances that reset state when returned to their pool.
///
/// `recycle` runs exactly once per borrow, no matter how often the borrowed
/// instance is released.
pub trait Recyclable: Send + Sync + 'static {
    fn recycle(&self);
}
