//! Driver-managed job kinds and the collaborators they call.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::error::BoxError;

pub mod template_build;
pub mod template_delete;

pub use template_build::{BuildSpec, TemplateBuild, TemplateBuildConfig, TemplateBuildJob};
pub use template_delete::{Template, TemplateDelete, TemplateDeleteConfig, TemplateDeleteJob};

/// Object storage client for one bucket.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Delete every object under `prefix`, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, BoxError>;
    /// Close the client.
    fn close(&self) -> Result<(), BoxError>;
}

/// Opens storage clients per bucket.
#[async_trait]
pub trait StorageFactory: Send + Sync {
    /// Open a client for `bucket`.
    async fn open(&self, bucket: &str) -> Result<Arc<dyn ObjectStorage>, BoxError>;
}

/// Container image registry holding template images.
#[async_trait]
pub trait ArtifactRegistry: Send + Sync {
    /// Delete the image of `template_id`.
    async fn delete_image(&self, template_id: &str) -> Result<(), BoxError>;
}

/// Builds template root filesystems.
#[async_trait]
pub trait TemplateBuilder: Send + Sync {
    /// Build the template. Must stop promptly once `cancel` fires.
    async fn build(&self, spec: &BuildSpec, cancel: CancellationToken) -> Result<(), BoxError>;
}
