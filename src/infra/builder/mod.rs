//! Template builders.

pub mod memory;

pub use memory::InMemoryTemplateBuilder;
