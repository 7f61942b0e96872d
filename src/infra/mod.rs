//! Infrastructure adapters for the orchestrator's collaborators.
//!
//! Only in-memory implementations live here. They support failure injection so
//! every error path of the core can be exercised without external services.

pub mod builder;
pub mod registry;
pub mod scheduler;
pub mod storage;
pub mod tenants;
pub mod usage;

pub use builder::InMemoryTemplateBuilder;
pub use registry::InMemoryArtifactRegistry;
pub use scheduler::InMemoryScheduler;
pub use storage::{InMemoryObjectStorage, InMemoryStorageFactory};
pub use tenants::InMemoryTenantStore;
pub use usage::InMemoryUsageTracker;
