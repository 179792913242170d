use ferrous_kernel::{
    Arguments, ComponentModel, ComponentName, DependencyModel, DiError, HandlerState, Kernel, KernelObserver, Resolver,
    ServiceType,
};
use parking_lot::Mutex;
use std::sync::Arc;

struct Database;

struct Repository {
    _db: Arc<Database>,
}

fn repository() -> ComponentModel {
    ComponentModel::builder("repository")
        .service::<Repository>()
        .depends_on(DependencyModel::of::<Database>("db"))
        .factory(|ctx| Ok(Repository { _db: ctx.dependency("db")? }))
        .build()
}

fn database() -> ComponentModel {
    ComponentModel::builder("database")
        .service::<Database>()
        .factory(|_| Ok(Database))
        .build()
}

#[test]
fn test_handler_waits_for_missing_dependency() {
    let kernel = Kernel::new();
    kernel.register(repository()).unwrap();

    assert_eq!(kernel.handler_state("repository"), Some(HandlerState::WaitingDependency));
    let waiting = kernel.waiting_handlers();
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].0, ComponentName::new("repository"));
    assert_eq!(waiting[0].1, vec!["db".to_string()]);

    match kernel.get::<Repository>() {
        Err(DiError::UnsatisfiedDependency { component, dependency, .. }) => {
            assert_eq!(component, "repository");
            assert_eq!(dependency, "db");
        }
        other => panic!("expected an unsatisfied dependency, got {:?}", other.map(|_| ())),
    }
    assert!(kernel.try_get::<Repository>().unwrap().is_none());
}

#[test]
fn test_registration_promotes_waiting_handlers() {
    let kernel = Kernel::new();
    kernel.register(repository()).unwrap();
    kernel.register(database()).unwrap();

    assert_eq!(kernel.handler_state("repository"), Some(HandlerState::Valid));
    assert!(kernel.waiting_handlers().is_empty());
    assert!(kernel.get::<Repository>().is_ok());
}

#[test]
fn test_promotion_cascades_through_chain() {
    struct Service;

    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("service")
                .service::<Service>()
                .depends_on(DependencyModel::of::<Repository>("repository"))
                .factory(|_| Ok(Service))
                .build(),
        )
        .unwrap();
    kernel.register(repository()).unwrap();
    assert_eq!(kernel.handler_state("service"), Some(HandlerState::WaitingDependency));

    kernel.register(database()).unwrap();
    assert_eq!(kernel.handler_state("repository"), Some(HandlerState::Valid));
    assert_eq!(kernel.handler_state("service"), Some(HandlerState::Valid));
}

#[test]
fn test_waiting_handler_resolves_with_inline_argument() {
    let kernel = Kernel::new();
    kernel.register(repository()).unwrap();

    let args = Arguments::new().with_named("db", Database);
    let repo = kernel.resolve_with(&ServiceType::of::<Repository>(), args).unwrap();
    assert!(repo.downcast_ref::<Repository>().is_some());
    assert_eq!(kernel.handler_state("repository"), Some(HandlerState::WaitingDependency));
}

#[test]
fn test_waiting_candidates_fall_back_on_inline_arguments() {
    trait Store: Send + Sync {
        fn name(&self) -> &'static str;
    }
    struct Cache;
    struct Primary;
    impl Store for Primary {
        fn name(&self) -> &'static str {
            "primary"
        }
    }
    struct Cached;
    impl Store for Cached {
        fn name(&self) -> &'static str {
            "cached"
        }
    }

    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("primary")
                .service::<dyn Store>()
                .depends_on(DependencyModel::of::<Database>("db"))
                .trait_factory::<dyn Store, _>(|_| Ok(Arc::new(Primary) as Arc<dyn Store>))
                .build(),
        )
        .unwrap();
    kernel
        .register(
            ComponentModel::builder("cached")
                .service::<dyn Store>()
                .depends_on(DependencyModel::of::<Cache>("cache"))
                .trait_factory::<dyn Store, _>(|_| Ok(Arc::new(Cached) as Arc<dyn Store>))
                .build(),
        )
        .unwrap();

    let service = ServiceType::of::<dyn Store>();
    let store = kernel
        .resolve_with(&service, Arguments::new().with_named("cache", Cache))
        .unwrap();
    let store = store.downcast_ref::<Arc<dyn Store>>().unwrap();
    assert_eq!(store.name(), "cached");

    // Without arguments the first candidate's failure is reported.
    match kernel.resolve(&service) {
        Err(DiError::UnsatisfiedDependency { component, .. }) => assert_eq!(component, "primary"),
        other => panic!("expected an unsatisfied dependency, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_valid_handler_preferred_over_waiting() {
    trait Store: Send + Sync {
        fn name(&self) -> &'static str;
    }
    struct Remote;
    impl Store for Remote {
        fn name(&self) -> &'static str {
            "remote"
        }
    }
    struct Memory;
    impl Store for Memory {
        fn name(&self) -> &'static str {
            "memory"
        }
    }

    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("remote")
                .service::<dyn Store>()
                .depends_on(DependencyModel::of::<Database>("db"))
                .trait_factory::<dyn Store, _>(|_| Ok(Arc::new(Remote) as Arc<dyn Store>))
                .build(),
        )
        .unwrap();
    kernel
        .register(
            ComponentModel::builder("memory")
                .service::<dyn Store>()
                .trait_factory::<dyn Store, _>(|_| Ok(Arc::new(Memory) as Arc<dyn Store>))
                .build(),
        )
        .unwrap();

    assert_eq!(kernel.get_required_trait::<dyn Store>().name(), "memory");

    // Once remote becomes valid, registration order decides again.
    kernel.register(database()).unwrap();
    assert_eq!(kernel.get_required_trait::<dyn Store>().name(), "remote");
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl KernelObserver for Recorder {
    fn registered(&self, model: &ComponentModel, state: HandlerState) {
        self.events.lock().push(format!("registered:{}:{:?}", model.name(), state));
    }

    fn handler_state_changed(&self, component: &ComponentName, state: HandlerState) {
        self.events.lock().push(format!("changed:{}:{:?}", component, state));
    }

    fn resolution_failed(&self, service: &ServiceType, _error: &DiError) {
        self.events.lock().push(format!("failed:{}", service));
    }
}

#[test]
fn test_observer_sees_state_changes() {
    let recorder = Arc::new(Recorder::default());
    let kernel = Kernel::new();
    kernel.add_observer(recorder.clone());

    kernel.register(repository()).unwrap();
    let _ = kernel.get::<Repository>();
    kernel.register(database()).unwrap();

    let events = recorder.events.lock().clone();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0], "registered:repository:WaitingDependency");
    assert!(events[1].starts_with("failed:"));
    assert_eq!(events[2], "registered:database:Valid");
    assert_eq!(events[3], "changed:repository:Valid");
}
