//! Core traits for the dependency injection kernel.

mod dispose;
mod resolver;

pub use dispose::{Dispose, Recyclable};
pub use resolver::{Resolver, ResolverCore};
