use ferrous_kernel::{
    ComponentModel, CreationContext, DependencyModel, DiError, DiResult, Kernel, Lifestyle, LifetimeScope, Resolver,
    ScopeAccessor, ServiceType, ThreadScopeAccessor,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

struct UnitOfWork {
    id: usize,
}

fn register_unit_of_work(kernel: &Kernel, lifestyle: Lifestyle, destroyed: &Arc<AtomicUsize>) {
    let created = Arc::new(AtomicUsize::new(0));
    let destroyed = destroyed.clone();
    kernel
        .register(
            ComponentModel::builder("unit-of-work")
                .service::<UnitOfWork>()
                .lifestyle(lifestyle)
                .factory(move |_| {
                    Ok(UnitOfWork {
                        id: created.fetch_add(1, Ordering::SeqCst),
                    })
                })
                .on_destroy(move |_: &UnitOfWork| {
                    destroyed.fetch_add(1, Ordering::SeqCst);
                })
                .build(),
        )
        .unwrap();
}

#[test]
fn test_scoped_without_scope_fails() {
    let kernel = Kernel::new();
    register_unit_of_work(&kernel, Lifestyle::scoped(), &Arc::default());

    match kernel.get::<UnitOfWork>() {
        Err(DiError::MissingScope { component, lifestyle, .. }) => {
            assert_eq!(component, "unit-of-work");
            assert_eq!(lifestyle, "scoped");
        }
        other => panic!("expected a missing scope error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_scoped_instance_shared_within_scope_and_released_at_end() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let kernel = Kernel::new();
    register_unit_of_work(&kernel, Lifestyle::scoped(), &destroyed);

    let scope = kernel.begin_scope();
    let a = kernel.get_required::<UnitOfWork>();
    let b = kernel.get_required::<UnitOfWork>();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(scope.scope().cached_count(), 1);
    // Scoped instances belong to the scope, not the release policy.
    assert_eq!(kernel.release_policy().tracked_count(), 0);

    drop(scope);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert!(kernel.get::<UnitOfWork>().is_err());
}

#[test]
fn test_nested_scopes_use_innermost() {
    let kernel = Kernel::new();
    register_unit_of_work(&kernel, Lifestyle::scoped(), &Arc::default());

    let outer = kernel.begin_scope();
    let first = kernel.get_required::<UnitOfWork>();
    {
        let inner = kernel.begin_scope();
        let nested = kernel.get_required::<UnitOfWork>();
        assert_ne!(first.id, nested.id);
        inner.dispose();
    }
    let again = kernel.get_required::<UnitOfWork>();
    assert_eq!(first.id, again.id);
    drop(outer);
}

#[test]
fn test_scope_of_another_kernel_is_ignored() {
    let kernel = Kernel::new();
    let other = Kernel::new();
    register_unit_of_work(&kernel, Lifestyle::scoped(), &Arc::default());

    let _foreign = other.begin_scope();
    assert!(matches!(kernel.get::<UnitOfWork>(), Err(DiError::MissingScope { .. })));
}

#[test]
fn test_scopes_are_per_thread() {
    let kernel = Kernel::new();
    register_unit_of_work(&kernel, Lifestyle::scoped(), &Arc::default());

    let _scope = kernel.begin_scope();
    let here = kernel.get_required::<UnitOfWork>();

    let worker = kernel.clone();
    let result = thread::spawn(move || worker.get::<UnitOfWork>().map(|u| u.id))
        .join()
        .unwrap();
    assert!(matches!(result, Err(DiError::MissingScope { .. })));
    assert_eq!(here.id, kernel.get_required::<UnitOfWork>().id);
}

#[test]
fn test_per_thread_lifestyle() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let kernel = Kernel::new();
    register_unit_of_work(&kernel, Lifestyle::PerThread, &destroyed);

    let a = kernel.get_required::<UnitOfWork>();
    let b = kernel.get_required::<UnitOfWork>();
    assert!(Arc::ptr_eq(&a, &b));

    let worker = kernel.clone();
    let other_id = thread::spawn(move || worker.get_required::<UnitOfWork>().id)
        .join()
        .unwrap();
    assert_ne!(a.id, other_id);

    kernel.dispose();
    assert_eq!(destroyed.load(Ordering::SeqCst), 2);
}

#[test]
fn test_ending_thread_scope_releases_it_early() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let accessor = Arc::new(ThreadScopeAccessor::new());
    let kernel = Kernel::new();
    register_unit_of_work(&kernel, Lifestyle::Scoped(Some(accessor.clone())), &destroyed);

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let kernel = kernel.clone();
            let accessor = accessor.clone();
            thread::spawn(move || {
                let first = kernel.get_required::<UnitOfWork>();
                assert!(Arc::ptr_eq(&first, &kernel.get_required::<UnitOfWork>()));
                assert!(accessor.end_current_thread());
                assert!(!accessor.end_current_thread());
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(accessor.scope_count(), 0);
    assert_eq!(destroyed.load(Ordering::SeqCst), 4);

    // Scopes left open are still released with the kernel.
    kernel.get_required::<UnitOfWork>();
    assert_eq!(accessor.scope_count(), 1);
    kernel.dispose();
    assert_eq!(destroyed.load(Ordering::SeqCst), 5);
}

struct Repository {
    uow: Arc<UnitOfWork>,
}

struct Controller {
    orders: Arc<Repository>,
    customers: Arc<Repository>,
}

fn register_bound_graph(kernel: &Kernel, destroyed: &Arc<AtomicUsize>) {
    register_unit_of_work(kernel, Lifestyle::bound_to(ServiceType::of::<Controller>()), destroyed);
    for name in ["orders", "customers"] {
        kernel
            .register(
                ComponentModel::builder(name)
                    .service::<Repository>()
                    .depends_on(DependencyModel::of::<UnitOfWork>("uow"))
                    .factory(|ctx| Ok(Repository { uow: ctx.dependency("uow")? }))
                    .build(),
            )
            .unwrap();
    }
    kernel
        .register(
            ComponentModel::builder("controller")
                .service::<Controller>()
                .depends_on(DependencyModel::of::<Repository>("orders").reference("orders"))
                .depends_on(DependencyModel::of::<Repository>("customers").reference("customers"))
                .factory(|ctx| {
                    Ok(Controller {
                        orders: ctx.dependency("orders")?,
                        customers: ctx.dependency("customers")?,
                    })
                })
                .build(),
        )
        .unwrap();
}

#[test]
fn test_bound_instance_shared_under_one_root() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let kernel = Kernel::new();
    register_bound_graph(&kernel, &destroyed);

    let first = kernel.get_required::<Controller>();
    let second = kernel.get_required::<Controller>();

    assert!(Arc::ptr_eq(&first.orders.uow, &first.customers.uow));
    assert!(!Arc::ptr_eq(&first.orders.uow, &second.orders.uow));

    // The bound instance needs decommissioning, so its root is tracked.
    assert_eq!(kernel.release_policy().tracked_count(), 2);
    assert!(kernel.release_typed(&first));
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);

    kernel.dispose();
    assert_eq!(destroyed.load(Ordering::SeqCst), 2);
}

#[test]
fn test_bound_without_matching_ancestor_fails() {
    let kernel = Kernel::new();
    register_bound_graph(&kernel, &Arc::default());

    assert!(matches!(kernel.get::<UnitOfWork>(), Err(DiError::MissingScope { .. })));
    assert!(matches!(
        kernel.get_named::<Repository>("orders"),
        Err(DiError::MissingScope { .. })
    ));
}

/// Hands out a single fixed scope.
struct FixedScope(Arc<LifetimeScope>);

impl ScopeAccessor for FixedScope {
    fn get_scope(&self, _ctx: &CreationContext) -> DiResult<Option<Arc<LifetimeScope>>> {
        Ok(Some(self.0.clone()))
    }
}

#[test]
fn test_custom_scope_accessor() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let scope = LifetimeScope::new();
    let kernel = Kernel::new();
    register_unit_of_work(
        &kernel,
        Lifestyle::Scoped(Some(Arc::new(FixedScope(scope.clone())))),
        &destroyed,
    );

    let a = kernel.get_required::<UnitOfWork>();
    let b = thread::spawn({
        let kernel = kernel.clone();
        move || kernel.get_required::<UnitOfWork>()
    })
    .join()
    .unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    scope.dispose();
    assert!(scope.is_disposed());
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert!(matches!(kernel.get::<UnitOfWork>(), Err(DiError::Disposed(_))));
}
