//! Template build job.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::driver::{JobKind, TaskConfig};
use crate::core::error::BoxError;
use crate::core::handle::{ExitResult, Job, ReleaseResources};
use crate::core::jobs::TemplateBuilder;
use crate::util::telemetry::{Attribute, Telemetry};

/// Decoded `driver_config` of a build job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateBuildConfig {
    /// Template being built.
    #[serde(rename = "TemplateID")]
    pub template_id: String,
    /// Build identity.
    #[serde(rename = "BuildID")]
    pub build_id: String,
    /// Guest kernel version.
    #[serde(rename = "KernelVersion")]
    pub kernel_version: String,
    /// Hypervisor version.
    #[serde(rename = "FirecrackerVersion")]
    pub firecracker_version: String,
    /// Virtual CPUs.
    #[serde(rename = "VCpuCount")]
    pub vcpu_count: u32,
    /// Guest memory in MiB.
    #[serde(rename = "MemoryMB")]
    pub memory_mb: u32,
    /// Root filesystem size in MiB.
    #[serde(rename = "DiskSizeMB")]
    pub disk_size_mb: u32,
    /// Command started after the template boots.
    #[serde(rename = "StartCmd", default)]
    pub start_cmd: String,
    /// Parent span of the request that scheduled the job.
    #[serde(rename = "SpanID", default)]
    pub span_id: String,
    /// Trace of the request that scheduled the job.
    #[serde(rename = "TraceID", default)]
    pub trace_id: String,
}

/// Everything the builder needs for one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    /// Template being built.
    pub template_id: String,
    /// Build identity.
    pub build_id: String,
    /// Guest kernel version.
    pub kernel_version: String,
    /// Hypervisor version.
    pub firecracker_version: String,
    /// Virtual CPUs.
    pub vcpu_count: u32,
    /// Guest memory in MiB.
    pub memory_mb: u32,
    /// Root filesystem size in MiB.
    pub disk_size_mb: u32,
    /// Command started after the template boots.
    pub start_cmd: String,
    /// Registry the base image is pulled from.
    pub docker_registry: String,
    /// Disk path the built template is written to.
    pub envs_disk_path: String,
}

/// Job kind for template builds.
pub struct TemplateBuild {
    builder: Arc<dyn TemplateBuilder>,
}

impl TemplateBuild {
    /// Create the job kind.
    pub fn new(builder: Arc<dyn TemplateBuilder>) -> Self {
        Self { builder }
    }
}

#[async_trait]
impl JobKind for TemplateBuild {
    type Config = TemplateBuildConfig;
    type Extra = TemplateBuildJob;

    const NAME: &'static str = "template-build";

    fn validate(config: &Self::Config) -> Result<(), String> {
        let required = [
            ("TemplateID", &config.template_id),
            ("BuildID", &config.build_id),
            ("KernelVersion", &config.kernel_version),
            ("FirecrackerVersion", &config.firecracker_version),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(format!("{name} must not be empty"));
        }
        let sizes = [
            ("VCpuCount", config.vcpu_count),
            ("MemoryMB", config.memory_mb),
            ("DiskSizeMB", config.disk_size_mb),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, value)| *value == 0) {
            return Err(format!("{name} must be greater than 0"));
        }
        Ok(())
    }

    async fn prepare(
        &self,
        task: &TaskConfig,
        config: Self::Config,
        telemetry: &dyn Telemetry,
    ) -> Result<Self::Extra, BoxError> {
        telemetry.set_attributes(&[
            Attribute::new("template_id", &config.template_id),
            Attribute::new("build_id", &config.build_id),
            Attribute::new("kernel_version", &config.kernel_version),
        ]);
        let spec = BuildSpec {
            template_id: config.template_id,
            build_id: config.build_id,
            kernel_version: config.kernel_version,
            firecracker_version: config.firecracker_version,
            vcpu_count: config.vcpu_count,
            memory_mb: config.memory_mb,
            disk_size_mb: config.disk_size_mb,
            start_cmd: config.start_cmd,
            docker_registry: task.env_var("DOCKER_REGISTRY").to_owned(),
            envs_disk_path: task.env_var("ENVS_DISK").to_owned(),
        };
        Ok(TemplateBuildJob {
            spec,
            builder: Arc::clone(&self.builder),
        })
    }
}

/// Payload of a build job.
pub struct TemplateBuildJob {
    spec: BuildSpec,
    builder: Arc<dyn TemplateBuilder>,
}

impl TemplateBuildJob {
    /// Build being executed.
    pub const fn spec(&self) -> &BuildSpec {
        &self.spec
    }
}

impl ReleaseResources for TemplateBuildJob {}

#[async_trait]
impl Job for TemplateBuildJob {
    async fn run(&self, cancel: CancellationToken) -> ExitResult {
        let spec = &self.spec;
        tracing::info!(template_id = %spec.template_id, build_id = %spec.build_id, "building template");

        match self.builder.build(spec, cancel.child_token()).await {
            Ok(()) if cancel.is_cancelled() => ExitResult::cancelled(),
            Ok(()) => {
                tracing::info!(template_id = %spec.template_id, build_id = %spec.build_id, "template built");
                ExitResult::success()
            }
            Err(err) => {
                tracing::error!(build_id = %spec.build_id, error = %err, "template build failed");
                ExitResult::failed(format!("error building template: {err}"))
            }
        }
    }
}
