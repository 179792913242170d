use ferrous_kernel::{
    ComponentModel, DependencyModel, DiError, GenericDefinition, HandlerState, Instance, Kernel, Lifestyle, Resolver,
    ServiceType,
};
use std::sync::Arc;

/// What an open `Repository<T>` component produces once closed.
struct Repository {
    entity: String,
}

fn repository_of(entity: ServiceType) -> ServiceType {
    ServiceType::generic("Repository", vec![entity])
}

fn open_repository(lifestyle: Lifestyle) -> ComponentModel {
    ComponentModel::builder("repository")
        .open_service(GenericDefinition::new("Repository", 1))
        .implementation_name("SqlRepository")
        .generic_parameters(1)
        .lifestyle(lifestyle)
        .factory(|ctx| {
            Ok(Repository {
                entity: ctx.type_arguments()[0].display_name(),
            })
        })
        .build()
}

fn entity_of(instance: &Instance) -> &str {
    &instance.downcast_ref::<Repository>().unwrap().entity
}

#[test]
fn test_open_generic_closes_per_service() {
    let kernel = Kernel::new();
    kernel.register(open_repository(Lifestyle::Singleton)).unwrap();

    let users = kernel.resolve(&repository_of(ServiceType::contract("User"))).unwrap();
    let orders = kernel.resolve(&repository_of(ServiceType::contract("Order"))).unwrap();
    let users_again = kernel.resolve(&repository_of(ServiceType::contract("User"))).unwrap();

    assert_eq!(entity_of(&users), "User");
    assert_eq!(entity_of(&orders), "Order");
    assert!(Arc::ptr_eq(&users, &users_again));
    assert!(!Arc::ptr_eq(&users, &orders));

    let closed = kernel.handler("repository[Repository<User>]").unwrap();
    assert_eq!(closed.state(), HandlerState::Valid);
    assert_eq!(closed.model().type_arguments(), &[ServiceType::contract("User")]);
}

#[test]
fn test_open_generic_ignores_other_arity() {
    let kernel = Kernel::new();
    kernel.register(open_repository(Lifestyle::Transient)).unwrap();

    let service = ServiceType::generic(
        "Repository",
        vec![ServiceType::contract("User"), ServiceType::contract("Tenant")],
    );
    assert!(matches!(kernel.resolve(&service), Err(DiError::NotFound(_))));
}

#[test]
fn test_implementation_needing_more_parameters_fails() {
    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("cache")
                .open_service(GenericDefinition::new("Cache", 1))
                .implementation_name("TwoLevelCache")
                .generic_parameters(2)
                .factory(|_| Ok(0u8))
                .build(),
        )
        .unwrap();

    let service = ServiceType::generic("Cache", vec![ServiceType::of::<u32>()]);
    match kernel.resolve(&service) {
        Err(DiError::GenericArityMismatch {
            provided, required, implementation, ..
        }) => {
            assert_eq!(provided, 1);
            assert_eq!(required, 2);
            assert_eq!(implementation, "TwoLevelCache");
        }
        other => panic!("expected an arity mismatch, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_closed_generic_satisfies_dependency() {
    struct UserService {
        repository: Arc<Repository>,
    }

    let kernel = Kernel::new();
    kernel.register(open_repository(Lifestyle::Transient)).unwrap();
    kernel
        .register(
            ComponentModel::builder("users")
                .service::<UserService>()
                .depends_on(DependencyModel::new(
                    "repository",
                    repository_of(ServiceType::of::<u64>()),
                ))
                .factory(|ctx| Ok(UserService { repository: ctx.dependency("repository")? }))
                .build(),
        )
        .unwrap();

    assert_eq!(kernel.handler_state("users"), Some(HandlerState::Valid));
    assert_eq!(kernel.get_required::<UserService>().repository.entity, "u64");
}

#[test]
fn test_mixing_open_and_closed_services_is_rejected() {
    let kernel = Kernel::new();
    let err = kernel
        .register(
            ComponentModel::builder("mixed")
                .service::<u8>()
                .open_service(GenericDefinition::new("Repository", 1))
                .factory(|_| Ok(0u8))
                .build(),
        )
        .unwrap_err();
    assert!(matches!(err, DiError::Registration(_)));
}
