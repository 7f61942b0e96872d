//! Object storage clients.

pub mod memory;

pub use memory::{InMemoryObjectStorage, InMemoryStorageFactory};
