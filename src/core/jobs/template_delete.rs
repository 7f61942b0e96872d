//! Template deletion job: removes a template's files from the bucket and its image from the registry.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::driver::{JobKind, TaskConfig};
use crate::core::error::{BoxError, ReleaseError};
use crate::core::handle::{ExitResult, Job, ReleaseResources};
use crate::core::jobs::{ArtifactRegistry, ObjectStorage, StorageFactory};
use crate::util::telemetry::{Attribute, Telemetry};

/// Decoded `driver_config` of a deletion job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDeleteConfig {
    /// Template to delete.
    #[serde(rename = "TemplateID")]
    pub template_id: String,
    /// Parent span of the request that scheduled the job.
    #[serde(rename = "SpanID")]
    pub span_id: String,
    /// Trace of the request that scheduled the job.
    #[serde(rename = "TraceID")]
    pub trace_id: String,
}

/// Where a template's artifacts live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Template identity.
    pub template_id: String,
    /// Disk path holding built templates.
    pub envs_disk_path: String,
    /// Path of docker build contexts inside the bucket.
    pub docker_contexts_path: String,
    /// Registry holding the template image.
    pub docker_registry_name: String,
    /// Cloud project.
    pub project_id: String,
    /// Cloud region.
    pub region: String,
    /// Bucket holding build contexts.
    pub bucket_name: String,
}

impl Template {
    fn from_env(template_id: String, task: &TaskConfig) -> Self {
        Self {
            template_id,
            envs_disk_path: task.env_var("ENVS_DISK").to_owned(),
            docker_contexts_path: task.env_var("DOCKER_CONTEXTS_PATH").to_owned(),
            docker_registry_name: task.env_var("DOCKER_REGISTRY").to_owned(),
            project_id: task.env_var("PROJECT_ID").to_owned(),
            region: task.env_var("REGION").to_owned(),
            bucket_name: task.env_var("BUCKET_NAME").to_owned(),
        }
    }

    /// Object prefix of the template's build context.
    #[must_use]
    pub fn storage_prefix(&self) -> String {
        format!("{}/", self.template_id)
    }
}

/// Job kind for template deletion.
pub struct TemplateDelete {
    storage: Arc<dyn StorageFactory>,
    registry: Arc<dyn ArtifactRegistry>,
}

impl TemplateDelete {
    /// Create the job kind from its collaborators.
    pub fn new(storage: Arc<dyn StorageFactory>, registry: Arc<dyn ArtifactRegistry>) -> Self {
        Self { storage, registry }
    }
}

#[async_trait]
impl JobKind for TemplateDelete {
    type Config = TemplateDeleteConfig;
    type Extra = TemplateDeleteJob;

    const NAME: &'static str = "template-delete";

    fn validate(config: &Self::Config) -> Result<(), String> {
        if config.template_id.is_empty() {
            return Err("TemplateID must not be empty".into());
        }
        Ok(())
    }

    async fn prepare(
        &self,
        task: &TaskConfig,
        config: Self::Config,
        telemetry: &dyn Telemetry,
    ) -> Result<Self::Extra, BoxError> {
        let template = Template::from_env(config.template_id, task);
        telemetry.set_attributes(&[
            Attribute::new("template_id", &template.template_id),
            Attribute::new("contexts_path", &template.docker_contexts_path),
            Attribute::new("contexts_bucket", &template.bucket_name),
            Attribute::new("registry", &template.docker_registry_name),
            Attribute::new("envs_disk", &template.envs_disk_path),
        ]);

        let storage = self.storage.open(&template.bucket_name).await?;
        Ok(TemplateDeleteJob {
            template,
            storage,
            registry: Arc::clone(&self.registry),
        })
    }
}

/// Payload of a deletion job. Owns the storage client.
pub struct TemplateDeleteJob {
    template: Template,
    storage: Arc<dyn ObjectStorage>,
    registry: Arc<dyn ArtifactRegistry>,
}

impl TemplateDeleteJob {
    /// Template being deleted.
    pub const fn template(&self) -> &Template {
        &self.template
    }
}

impl ReleaseResources for TemplateDeleteJob {
    fn release(&self) -> Result<(), ReleaseError> {
        self.storage
            .close()
            .map_err(|err| ReleaseError::new("cloud storage client", err))
    }
}

#[async_trait]
impl Job for TemplateDeleteJob {
    async fn run(&self, cancel: CancellationToken) -> ExitResult {
        let template_id = &self.template.template_id;
        let prefix = self.template.storage_prefix();

        let removed = tokio::select! {
            () = cancel.cancelled() => return ExitResult::cancelled(),
            res = self.storage.delete_prefix(&prefix) => res,
        };
        match removed {
            Ok(count) => tracing::debug!(template_id = %template_id, count, "deleted template files"),
            Err(err) => {
                tracing::error!(template_id = %template_id, error = %err, "error deleting template files");
                return ExitResult::failed(format!("error deleting template files: {err}"));
            }
        }

        let image = tokio::select! {
            () = cancel.cancelled() => return ExitResult::cancelled(),
            res = self.registry.delete_image(template_id) => res,
        };
        if let Err(err) = image {
            tracing::error!(template_id = %template_id, error = %err, "error deleting template image");
            return ExitResult::failed(format!("error deleting template image: {err}"));
        }

        tracing::info!(template_id = %template_id, "template deleted");
        ExitResult::success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_reads_env_keys() {
        let task = TaskConfig::new("t")
            .with_env("BUCKET_NAME", "contexts")
            .with_env("DOCKER_REGISTRY", "registry")
            .with_env("ENVS_DISK", "/envs");
        let template = Template::from_env("tpl".into(), &task);
        assert_eq!(template.bucket_name, "contexts");
        assert_eq!(template.docker_registry_name, "registry");
        assert_eq!(template.envs_disk_path, "/envs");
        assert_eq!(template.project_id, "");
        assert_eq!(template.storage_prefix(), "tpl/");
    }

    #[test]
    fn empty_template_id_is_invalid() {
        let config = TemplateDeleteConfig {
            template_id: String::new(),
            span_id: String::new(),
            trace_id: String::new(),
        };
        assert!(TemplateDelete::validate(&config).is_err());
    }
}
