#![no_main]

use ferrous_kernel::{ComponentModel, DependencyModel, DiError, HandlerState, Kernel, ServiceType};
use libfuzzer_sys::fuzz_target;

const NODES: usize = 8;

fn contract(node: usize) -> ServiceType {
    ServiceType::contract(format!("Node{node}"))
}

// Each pair of bytes adds an edge `from -> to`; the order in which nodes
// are registered follows their first appearance in the input.
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let mut edges = vec![Vec::new(); NODES];
    let mut order = Vec::new();
    for pair in data.chunks_exact(2) {
        let from = pair[0] as usize % NODES;
        let to = pair[1] as usize % NODES;
        if !edges[from].contains(&to) {
            edges[from].push(to);
        }
        for node in [from, to] {
            if !order.contains(&node) {
                order.push(node);
            }
        }
    }

    let kernel = Kernel::new();
    for (position, &node) in order.iter().enumerate() {
        // Leave the last node unregistered on odd inputs so some handlers wait.
        if data.len() % 2 == 1 && position + 1 == order.len() {
            break;
        }
        let mut builder = ComponentModel::builder(format!("node-{node}")).service_type(contract(node));
        for &target in &edges[node] {
            builder = builder.depends_on(DependencyModel::new(format!("dep-{target}"), contract(target)));
        }
        let deps = edges[node].clone();
        kernel
            .register(
                builder
                    .factory(move |ctx| {
                        for target in &deps {
                            ctx.dependency_instance(&format!("dep-{target}"))?;
                        }
                        Ok(node)
                    })
                    .build(),
            )
            .expect("distinct node names");
    }

    for node in 0..NODES {
        let name = format!("node-{node}");
        let Some(state) = kernel.handler_state(name.as_str()) else {
            continue;
        };
        match kernel.resolve(&contract(node)) {
            Ok(instance) => assert_eq!(instance.downcast_ref::<usize>(), Some(&node)),
            Err(DiError::Circular(path)) => assert!(path.len() >= 2),
            Err(DiError::UnsatisfiedDependency { .. }) => {}
            Err(other) => panic!("unexpected error for {name}: {other}"),
        }
        if state == HandlerState::WaitingDependency {
            assert!(kernel.waiting_handlers().iter().any(|(waiting, _)| waiting.as_str() == name));
        }
    }
    kernel.dispose();
});
