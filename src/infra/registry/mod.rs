//! Artifact registries.

pub mod memory;

pub use memory::InMemoryArtifactRegistry;
