//! Task lifecycle, registries and admission control.

pub mod admission;
pub mod analytics;
pub mod driver;
pub mod error;
pub mod handle;
pub mod instance_cache;
pub mod jobs;
pub mod spawn;
pub mod stats;
pub mod store;

pub use admission::{
    clean_env_id, AccessCheck, AdmissionFlow, AdmissionPolicy, CreateSandbox, EnvRecord,
    SandboxRequest, SchedulerClient, Team, TenantStore, Tier, UsageTracker,
};
pub use analytics::{
    build_analytics_event, AnalyticsEvent, AnalyticsSink, InMemoryAnalyticsSink,
    TracingAnalyticsSink, CREATED_INSTANCE,
};
pub use driver::{Driver, DriverHandle, DriverNetwork, DriverTaskState, JobKind, TaskConfig};
pub use error::{
    AdmissionError, AppResult, BoxError, CacheError, CompensationOutcome, DriverError,
    ReleaseError, TenantStoreError, UpstreamError,
};
pub use handle::{ExitResult, Job, ReleaseResources, TaskHandle, TaskState};
pub use instance_cache::{EvictionHandler, EvictionReason, InstanceCache, InstanceInfo, Reservation, Sandbox};
pub use spawn::Spawn;
pub use stats::TaskResourceUsage;
pub use store::TaskStore;
