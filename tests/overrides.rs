use ferrous_kernel::{
    ComponentModel, DependencyModel, DependencyOverride, DependencyRequest, DiResult, HandlerState, Instance, Kernel,
    Resolver, SubDependencyResolver,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Endpoint {
    url: Arc<String>,
}

fn endpoint(name: &str) -> ComponentModel {
    ComponentModel::builder(name)
        .service::<Endpoint>()
        .depends_on(DependencyModel::of::<String>("url"))
        .factory(|ctx| Ok(Endpoint { url: ctx.dependency("url")? }))
        .build()
}

#[test]
fn test_key_override_beats_registry() {
    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("default-url")
                .service::<String>()
                .factory(|_| Ok("http://registry".to_string()))
                .build(),
        )
        .unwrap();

    let mut model = endpoint("endpoint");
    model.add_override(DependencyOverride::on_key("URL", "http://override".to_string()));
    kernel.register(model).unwrap();

    assert_eq!(*kernel.get_required::<Endpoint>().url, "http://override");
}

#[test]
fn test_override_satisfies_registration_check() {
    let kernel = Kernel::new();
    let mut model = endpoint("endpoint");
    model.add_override(DependencyOverride::on_type("http://typed".to_string()));
    kernel.register(model).unwrap();

    assert_eq!(kernel.handler_state("endpoint"), Some(HandlerState::Valid));
    assert_eq!(*kernel.get_required::<Endpoint>().url, "http://typed");
}

#[test]
fn test_dependency_override_targets_one_dependency() {
    struct Pair {
        left: Arc<String>,
        right: Arc<String>,
    }

    let left = DependencyModel::of::<String>("left");
    let right = DependencyModel::of::<String>("right");
    let pinned = DependencyOverride::on_dependency(&right, "pinned".to_string());

    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("fallback")
                .service::<String>()
                .factory(|_| Ok("fallback".to_string()))
                .build(),
        )
        .unwrap();
    kernel
        .register(
            ComponentModel::builder("pair")
                .service::<Pair>()
                .depends_on(left)
                .depends_on(right)
                .override_dependency(pinned)
                .factory(|ctx| {
                    Ok(Pair {
                        left: ctx.dependency("left")?,
                        right: ctx.dependency("right")?,
                    })
                })
                .build(),
        )
        .unwrap();

    let pair = kernel.get_required::<Pair>();
    assert_eq!(*pair.left, "fallback");
    assert_eq!(*pair.right, "pinned");
}

#[test]
fn test_service_override_picks_component() {
    let kernel = Kernel::new();
    for (name, url) in [("primary", "http://primary"), ("secondary", "http://secondary")] {
        kernel
            .register(
                ComponentModel::builder(name)
                    .service::<String>()
                    .factory(move |_| Ok(url.to_string()))
                    .build(),
            )
            .unwrap();
    }
    let mut model = endpoint("endpoint");
    model.add_override(DependencyOverride::service_override("url", "secondary"));
    kernel.register(model).unwrap();

    assert_eq!(*kernel.get_required::<Endpoint>().url, "http://secondary");
}

#[test]
fn test_parent_override_applies_to_nested_component() {
    struct Gateway {
        endpoint: Arc<Endpoint>,
    }

    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("url")
                .service::<String>()
                .factory(|_| Ok("http://registry".to_string()))
                .build(),
        )
        .unwrap();
    kernel.register(endpoint("endpoint")).unwrap();
    kernel
        .register(
            ComponentModel::builder("gateway")
                .service::<Gateway>()
                .depends_on(DependencyModel::of::<Endpoint>("endpoint"))
                .override_dependency(DependencyOverride::on_key("url", "http://from-parent".to_string()))
                .factory(|ctx| Ok(Gateway { endpoint: ctx.dependency("endpoint")? }))
                .build(),
        )
        .unwrap();

    assert_eq!(*kernel.get_required::<Gateway>().endpoint.url, "http://from-parent");
    // Without the parent the registry wins.
    assert_eq!(*kernel.get_required::<Endpoint>().url, "http://registry");
}

struct EnvUrl {
    calls: AtomicUsize,
}

impl SubDependencyResolver for EnvUrl {
    fn can_resolve(&self, request: &DependencyRequest<'_>) -> bool {
        request.dependency.key().as_str().eq_ignore_ascii_case("url")
    }

    fn resolve(&self, request: &DependencyRequest<'_>) -> DiResult<Option<Instance>> {
        assert!(request.context.is_some());
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Arc::new(format!("http://env/{}", request.model.name()))))
    }
}

#[test]
fn test_sub_resolver_runs_before_registry() {
    let resolver = Arc::new(EnvUrl {
        calls: AtomicUsize::new(0),
    });
    let kernel = Kernel::new();
    kernel.add_sub_resolver(resolver.clone());
    kernel.register(endpoint("endpoint")).unwrap();

    assert_eq!(kernel.handler_state("endpoint"), Some(HandlerState::Valid));
    assert_eq!(*kernel.get_required::<Endpoint>().url, "http://env/endpoint");
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
}
