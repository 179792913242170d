#![no_main]

use ferrous_kernel::{ComponentModel, DependencyModel, Instance, Kernel, Lifestyle};
use libfuzzer_sys::fuzz_target;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Leaf;
struct Root {
    _leaf: Arc<Leaf>,
}

// Interprets each byte as one operation against a kernel whose leaf
// lifestyle is chosen by the first byte.
fuzz_target!(|data: &[u8]| {
    let Some((&selector, ops)) = data.split_first() else {
        return;
    };
    let lifestyle = match selector % 4 {
        0 => Lifestyle::Transient,
        1 => Lifestyle::Singleton,
        2 => Lifestyle::pooled(1, 3),
        _ => Lifestyle::PerThread,
    };

    let created = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(AtomicUsize::new(0));
    let (counter, hook) = (created.clone(), destroyed.clone());

    let kernel = Kernel::new();
    kernel
        .register(
            ComponentModel::builder("leaf")
                .service::<Leaf>()
                .lifestyle(lifestyle)
                .factory(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Leaf)
                })
                .on_destroy(move |_: &Leaf| {
                    hook.fetch_add(1, Ordering::SeqCst);
                })
                .build(),
        )
        .expect("leaf registers");
    kernel
        .register(
            ComponentModel::builder("root")
                .service::<Root>()
                .depends_on(DependencyModel::of::<Leaf>("leaf"))
                .factory(|ctx| Ok(Root { _leaf: ctx.dependency("leaf")? }))
                .build(),
        )
        .expect("root registers");

    let mut held: Vec<Instance> = Vec::new();
    for &op in ops {
        match op % 3 {
            0 => held.push(kernel.resolve(&ferrous_kernel::ServiceType::of::<Leaf>()).expect("leaf resolves")),
            1 => held.push(kernel.resolve(&ferrous_kernel::ServiceType::of::<Root>()).expect("root resolves")),
            _ if !held.is_empty() => {
                let instance = held.remove(op as usize % held.len());
                kernel.release(&instance);
            }
            _ => {}
        }
        assert!(destroyed.load(Ordering::SeqCst) <= created.load(Ordering::SeqCst));
    }

    kernel.dispose();
    assert_eq!(kernel.release_policy().tracked_count(), 0);
    assert_eq!(destroyed.load(Ordering::SeqCst), created.load(Ordering::SeqCst));
});
