//! Template usage trackers.

pub mod memory;

pub use memory::InMemoryUsageTracker;
