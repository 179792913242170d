#![cfg(feature = "async")]

use ferrous_kernel::{within_scope, ComponentModel, DiError, Kernel, Lifestyle, Resolver};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Session {
    id: usize,
}

fn kernel_with_session(destroyed: Arc<AtomicUsize>) -> Kernel {
    let next = Arc::new(AtomicUsize::new(0));
    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("session")
                .service::<Session>()
                .lifestyle(Lifestyle::scoped())
                .factory(move |_| {
                    Ok(Session {
                        id: next.fetch_add(1, Ordering::SeqCst),
                    })
                })
                .on_destroy(move |_: &Session| {
                    destroyed.fetch_add(1, Ordering::SeqCst);
                })
                .build(),
        )
        .unwrap();
    kernel
}

#[tokio::test]
async fn test_scope_survives_await_points() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let kernel = kernel_with_session(destroyed.clone());

    let scope = kernel.create_scope();
    let (a, b) = within_scope(scope.clone(), async {
        let a = kernel.get_required::<Session>();
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        (a, kernel.get_required::<Session>())
    })
    .await;

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);
    scope.dispose();
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_spawned_tasks_get_their_own_scope() {
    let kernel = kernel_with_session(Arc::default());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let kernel = kernel.clone();
        tasks.push(tokio::spawn(async move {
            let scope = kernel.create_scope();
            let ids = within_scope(scope.clone(), async {
                let first = kernel.get_required::<Session>().id;
                tokio::task::yield_now().await;
                let second = kernel.get_required::<Session>().id;
                (first, second)
            })
            .await;
            scope.dispose();
            ids
        }));
    }

    let mut seen = Vec::new();
    for task in tasks {
        let (first, second) = task.await.unwrap();
        assert_eq!(first, second);
        seen.push(first);
    }
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 8);
}

#[tokio::test]
async fn test_outside_task_scope_is_missing() {
    let kernel = kernel_with_session(Arc::default());
    let scope = kernel.create_scope();
    within_scope(scope.clone(), async {
        assert!(kernel.get::<Session>().is_ok());
    })
    .await;

    assert!(matches!(kernel.get::<Session>(), Err(DiError::MissingScope { .. })));
    scope.dispose();
}

#[tokio::test]
async fn test_thread_scope_wins_over_task_scope() {
    let kernel = kernel_with_session(Arc::default());
    let task_scope = kernel.create_scope();

    within_scope(task_scope.clone(), async {
        let outer = kernel.get_required::<Session>();
        {
            let _guard = kernel.begin_scope();
            let inner = kernel.get_required::<Session>();
            assert_ne!(outer.id, inner.id);
        }
        assert!(Arc::ptr_eq(&outer, &kernel.get_required::<Session>()));
    })
    .await;
    task_scope.dispose();
}
