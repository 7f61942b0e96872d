//! Cluster scheduler clients.

pub mod memory;

pub use memory::InMemoryScheduler;
