use ferrous_kernel::{ComponentModel, DependencyModel, DiError, Kernel, KernelOptions, Lifestyle, Resolver};
use std::sync::Arc;

struct A;
struct B;
struct C;

/// Component whose factory pulls its single dependency before building.
fn component<T: Send + Sync + 'static>(
    name: &str,
    lifestyle: Lifestyle,
    dependency: DependencyModel,
    make: fn() -> T,
) -> ComponentModel {
    let key = dependency.key().to_string();
    ComponentModel::builder(name)
        .service::<T>()
        .lifestyle(lifestyle)
        .depends_on(dependency)
        .factory(move |ctx| {
            ctx.dependency_instance(&key)?;
            Ok(make())
        })
        .build()
}

#[test]
fn test_two_node_cycle_reports_chain() {
    let kernel = Kernel::new();
    kernel
        .register(component("a", Lifestyle::Transient, DependencyModel::of::<B>("b"), || A))
        .unwrap();
    kernel
        .register(component("b", Lifestyle::Transient, DependencyModel::of::<A>("a"), || B))
        .unwrap();

    match kernel.get::<A>() {
        Err(DiError::Circular(chain)) => assert_eq!(chain, vec!["a", "b", "a"]),
        other => panic!("expected a circular dependency error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_three_node_cycle_with_singletons() {
    let kernel = Kernel::new();
    kernel
        .register(component("a", Lifestyle::Singleton, DependencyModel::of::<B>("b"), || A))
        .unwrap();
    kernel
        .register(component("b", Lifestyle::Singleton, DependencyModel::of::<C>("c"), || B))
        .unwrap();
    kernel
        .register(component("c", Lifestyle::Singleton, DependencyModel::of::<A>("a"), || C))
        .unwrap();

    match kernel.get::<B>() {
        Err(DiError::Circular(chain)) => assert_eq!(chain, vec!["b", "c", "a", "b"]),
        other => panic!("expected a circular dependency error, got {:?}", other.map(|_| ())),
    }

    // A failed singleton creation leaves nothing behind.
    assert_eq!(kernel.release_policy().tracked_count(), 0);
}

#[test]
fn test_self_dependency_is_circular() {
    let kernel = Kernel::new();
    kernel
        .register(component("a", Lifestyle::Transient, DependencyModel::of::<A>("me"), || A))
        .unwrap();

    assert!(matches!(kernel.get::<A>(), Err(DiError::Circular(_))));
}

#[test]
fn test_cycle_through_ad_hoc_resolution() {
    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("a")
                .service::<A>()
                .factory(|ctx| {
                    ctx.get::<B>()?;
                    Ok(A)
                })
                .build(),
        )
        .unwrap();
    kernel
        .register(
            ComponentModel::builder("b")
                .service::<B>()
                .factory(|ctx| {
                    ctx.get::<A>()?;
                    Ok(B)
                })
                .build(),
        )
        .unwrap();

    match kernel.get::<A>() {
        Err(DiError::Circular(chain)) => assert_eq!(chain, vec!["a", "b", "a"]),
        other => panic!("expected a circular dependency error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_cycle_falls_back_to_other_implementation() {
    // a decorates the service it also provides; the inner one breaks the loop.
    struct Service(&'static str);

    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("decorator")
                .service::<Service>()
                .depends_on(DependencyModel::of::<Service>("inner"))
                .factory(|ctx| {
                    let inner = ctx.dependency::<Service>("inner")?;
                    Ok(Service(if inner.0 == "plain" { "decorated" } else { "broken" }))
                })
                .build(),
        )
        .unwrap();
    kernel
        .register(
            ComponentModel::builder("plain")
                .service::<Service>()
                .factory(|_| Ok(Service("plain")))
                .build(),
        )
        .unwrap();

    assert_eq!(kernel.get_required::<Service>().0, "decorated");
}

#[test]
fn test_optional_dependency_in_cycle_resolves_to_none() {
    struct Node {
        next: Option<Arc<Node>>,
    }

    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("node")
                .service::<Node>()
                .depends_on(DependencyModel::of::<Node>("next").optional())
                .factory(|ctx| {
                    Ok(Node {
                        next: ctx.optional_dependency::<Node>("next")?,
                    })
                })
                .build(),
        )
        .unwrap();

    assert!(kernel.get_required::<Node>().next.is_none());
}

#[test]
fn test_depth_limit() {
    struct Deep;

    let kernel = Kernel::with_options(KernelOptions::default().with_max_resolution_depth(3));
    kernel
        .register(
            ComponentModel::builder("leaf")
                .service::<u8>()
                .factory(|_| Ok(1u8))
                .build(),
        )
        .unwrap();
    let mut previous = "leaf".to_string();
    for level in 0..4u16 {
        let name = format!("level-{}", level);
        let dependency = previous.clone();
        kernel
            .register(
                ComponentModel::builder(name.as_str())
                    .service_type(ferrous_kernel::ServiceType::contract(name.as_str()))
                    .depends_on(DependencyModel::of::<u8>("next").reference(dependency.as_str()))
                    .factory(|_| Ok(Deep))
                    .build(),
            )
            .unwrap();
        previous = name;
    }

    assert!(kernel.resolve_named("level-1").is_ok());
    assert!(matches!(kernel.resolve_named("level-3"), Err(DiError::DepthExceeded(3))));
}
