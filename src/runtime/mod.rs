//! Runtime adapter and API-facing request/response models.

pub mod api;
pub mod tokio_spawner;

pub use api::{health, post_sandboxes, ErrorResponse, Health, PostSandboxRequest, SandboxResponse};
pub use tokio_spawner::TokioSpawner;
