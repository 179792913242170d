use ferrous_kernel::{
    ComponentModel, DependencyModel, Kernel, LifestyleKind, ReleasePolicy, Resolver, TrackedSnapshot,
};
use parking_lot::Mutex;
use std::sync::Arc;

struct Session;
struct Request {
    _session: Arc<Session>,
}

fn kernel_with_graph() -> Kernel {
    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("session")
                .service::<Session>()
                .factory(|_| Ok(Session))
                .on_destroy(|_: &Session| {})
                .build(),
        )
        .unwrap();
    kernel
        .register(
            ComponentModel::builder("request")
                .service::<Request>()
                .depends_on(DependencyModel::of::<Session>("session"))
                .factory(|ctx| Ok(Request { _session: ctx.dependency("session")? }))
                .build(),
        )
        .unwrap();
    kernel
}

#[test]
fn test_snapshot_lists_tracked_instances_oldest_first() {
    let kernel = kernel_with_graph();
    let _request = kernel.get_required::<Request>();
    let _session = kernel.get_required::<Session>();

    let snapshot = kernel.release_policy().snapshot();
    assert_eq!(snapshot.len(), 3);
    let components: Vec<&str> = snapshot.instances.iter().map(|i| i.component.as_str()).collect();
    assert_eq!(components, vec!["session", "request", "session"]);
    assert!(snapshot.instances.windows(2).all(|w| w[0].sequence < w[1].sequence));
    assert_eq!(snapshot.instances[1].children, 1);
    assert_eq!(snapshot.instances[1].lifestyle, LifestyleKind::Transient);
    assert_eq!(snapshot.count_by_component()["session"], 2);
}

#[test]
fn test_diagnostics_collector_shared_with_sub_policies() {
    let seen: Arc<Mutex<Vec<usize>>> = Arc::default();
    let kernel = kernel_with_graph();
    let sink = seen.clone();
    kernel
        .release_policy()
        .set_diagnostics(Arc::new(move |snapshot: &TrackedSnapshot| sink.lock().push(snapshot.len())));

    let _session = kernel.get_required::<Session>();
    kernel.release_policy().publish_diagnostics();

    let sub = kernel.create_sub_policy();
    sub.publish_diagnostics();

    assert_eq!(*seen.lock(), vec![1, 0]);
}

#[test]
fn test_policy_without_collector_publishes_nothing() {
    let policy = ReleasePolicy::new();
    policy.publish_diagnostics();
    assert!(policy.snapshot().is_empty());
    assert_eq!(policy.tracked_count(), 0);
}

#[test]
fn test_untracked_instance_release_returns_false() {
    let kernel = kernel_with_graph();
    let stranger: ferrous_kernel::Instance = Arc::new(Session);
    assert!(!kernel.release_policy().has_track(&stranger));
    assert!(!kernel.release(&stranger));
}

#[cfg(feature = "diagnostics")]
#[test]
fn test_snapshot_serializes_to_json() {
    let kernel = kernel_with_graph();
    let _session = kernel.get_required::<Session>();

    let json = kernel.release_policy().snapshot().to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["instances"][0]["component"], "session");
    assert_eq!(value["instances"][0]["children"], 0);
}
