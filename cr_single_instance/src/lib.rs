// single instance in memory implementation of ClientRegistryPort

mod registry;

pub use registry::*;
