//! Concurrent access: singleton consistency, pool accounting and scope
//! isolation under contention.

use crossbeam_utils::thread;
use ferrous_kernel::{ComponentModel, DependencyModel, Kernel, Lifestyle, Resolver, ServiceType};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

const THREADS: usize = 8;
const ITERATIONS: usize = 200;

struct Expensive {
    id: usize,
}

#[test]
fn test_singleton_created_once_under_contention() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();

    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("expensive")
                .service::<Expensive>()
                .lifestyle(Lifestyle::Singleton)
                .factory(move |_| {
                    std::thread::sleep(std::time::Duration::from_millis(5));
                    Ok(Expensive {
                        id: counter.fetch_add(1, Ordering::SeqCst),
                    })
                })
                .build(),
        )
        .unwrap();

    let barrier = Barrier::new(THREADS);
    let ids: Vec<usize> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|_| {
                    barrier.wait();
                    kernel.get_required::<Expensive>().id
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(ids.iter().all(|id| *id == 0));
}

#[test]
fn test_concurrent_resolve_and_release_keeps_policy_consistent() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let hook = destroyed.clone();

    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("connection")
                .service::<Expensive>()
                .factory(|_| Ok(Expensive { id: 0 }))
                .on_destroy(move |_: &Expensive| {
                    hook.fetch_add(1, Ordering::SeqCst);
                })
                .build(),
        )
        .unwrap();

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|_| {
                for _ in 0..ITERATIONS {
                    let connection = kernel.get_required::<Expensive>();
                    assert!(kernel.release_typed(&connection));
                }
            });
        }
    })
    .unwrap();

    assert_eq!(kernel.release_policy().tracked_count(), 0);
    assert_eq!(destroyed.load(Ordering::SeqCst), THREADS * ITERATIONS);
}

#[test]
fn test_pool_never_exceeds_bounds_under_contention() {
    struct Worker;
    let created = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let hook = destroyed.clone();

    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("worker")
                .service::<Worker>()
                .lifestyle(Lifestyle::pooled(2, 4))
                .factory(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Worker)
                })
                .on_destroy(move |_: &Worker| {
                    hook.fetch_add(1, Ordering::SeqCst);
                })
                .build(),
        )
        .unwrap();

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|_| {
                for _ in 0..ITERATIONS {
                    let worker = kernel.get_required::<Worker>();
                    assert!(kernel.release_typed(&worker));
                }
            });
        }
    })
    .unwrap();

    // Overflow instances are destroyed on release; what stays alive is pooled.
    let alive = created.load(Ordering::SeqCst) - destroyed.load(Ordering::SeqCst);
    assert!(alive <= 4);
    assert_eq!(kernel.release_policy().tracked_count(), 0);
}

#[test]
fn test_pooled_reuse_never_fails_under_contention() {
    struct Worker;
    let destroyed = Arc::new(AtomicUsize::new(0));
    let hook = destroyed.clone();

    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("worker")
                .service::<Worker>()
                .lifestyle(Lifestyle::pooled(2, 2))
                .factory(|_| Ok(Worker))
                .on_destroy(move |_: &Worker| {
                    hook.fetch_add(1, Ordering::SeqCst);
                })
                .build(),
        )
        .unwrap();

    let service = ServiceType::of::<Worker>();
    let errors = AtomicUsize::new(0);
    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|_| {
                for _ in 0..ITERATIONS * 50 {
                    match kernel.resolve(&service) {
                        Ok(worker) => {
                            kernel.release(&worker);
                        }
                        Err(_) => {
                            errors.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            });
        }
    })
    .unwrap();

    assert_eq!(errors.load(Ordering::SeqCst), 0);
    assert_eq!(kernel.release_policy().tracked_count(), 0);
}

#[test]
fn test_scopes_isolated_between_threads() {
    struct Request {
        id: usize,
    }
    struct Handler {
        first: Arc<Request>,
        second: Arc<Request>,
    }

    let next = Arc::new(AtomicUsize::new(0));
    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("request")
                .service::<Request>()
                .lifestyle(Lifestyle::scoped())
                .factory(move |_| {
                    Ok(Request {
                        id: next.fetch_add(1, Ordering::SeqCst),
                    })
                })
                .build(),
        )
        .unwrap();
    kernel
        .register(
            ComponentModel::builder("handler")
                .service::<Handler>()
                .depends_on(DependencyModel::of::<Request>("first"))
                .depends_on(DependencyModel::of::<Request>("second"))
                .factory(|ctx| {
                    Ok(Handler {
                        first: ctx.dependency("first")?,
                        second: ctx.dependency("second")?,
                    })
                })
                .build(),
        )
        .unwrap();

    let ids: Vec<usize> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|_| {
                    let _scope = kernel.begin_scope();
                    let handler = kernel.get_required::<Handler>();
                    assert!(Arc::ptr_eq(&handler.first, &handler.second));
                    handler.first.id
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), THREADS);
}
