//! Builders wiring configuration and collaborators into drivers, caches and admission flows.

use std::sync::Arc;

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;

use crate::config::OrchestratorConfig;
use crate::core::{
    AdmissionFlow, AdmissionPolicy, AnalyticsSink, AppResult, Driver, EvictionHandler,
    EvictionReason, InstanceCache, InstanceInfo, JobKind, SchedulerClient, Spawn, TenantStore,
    TracingAnalyticsSink, UsageTracker,
};
use crate::util::telemetry::{Telemetry, TracingTelemetry};

/// Build a driver for job kind `K` from configuration.
///
/// Every handle scope becomes a child of `scope`.
pub fn build_driver<K: JobKind, S: Spawn>(
    kind: K,
    cfg: &OrchestratorConfig,
    spawner: S,
    scope: CancellationToken,
    telemetry: Arc<dyn Telemetry>,
) -> AppResult<Driver<K, S>> {
    cfg.driver
        .validate()
        .map_err(|e| anyhow!("driver config invalid: {e}"))?;
    Ok(Driver::new(kind, spawner, scope, telemetry)
        .with_shards(cfg.driver.shards)
        .with_stats_buffer(cfg.driver.stats_buffer)
        .with_stats_interval(cfg.driver.stats_interval()))
}

/// Build an instance cache from configuration and start its expiry reaper.
///
/// The reaper sweeps every `sweep_interval` until `cancel` fires; `on_evict`
/// sees every expired or removed instance.
pub fn build_instance_cache<S: Spawn>(
    cfg: &OrchestratorConfig,
    on_evict: Option<EvictionHandler>,
    spawner: &S,
    cancel: CancellationToken,
) -> AppResult<Arc<InstanceCache>> {
    let settings = &cfg.instance_cache;
    settings
        .validate()
        .map_err(|e| anyhow!("instance_cache config invalid: {e}"))?;
    let mut cache = InstanceCache::with_shards(settings.ttl(), settings.shards);
    if let Some(handler) = on_evict {
        cache = cache.with_eviction_handler(handler);
    }
    let cache = Arc::new(cache);
    cache.spawn_reaper(spawner, settings.sweep_interval(), cancel);
    Ok(cache)
}

/// Eviction handler that deletes the evicted sandbox on the scheduler.
pub fn scheduler_eviction_handler<S>(scheduler: Arc<dyn SchedulerClient>, spawner: S) -> EvictionHandler
where
    S: Spawn + 'static,
{
    Arc::new(move |info: &InstanceInfo, reason: EvictionReason| {
        let scheduler = Arc::clone(&scheduler);
        let id = info.instance.sandbox_id.clone();
        spawner.spawn(async move {
            if let Err(err) = scheduler.delete_instance(&id, true).await {
                tracing::error!(sandbox_id = %id, ?reason, error = %err, "error deleting evicted instance");
            }
        });
    })
}

/// Builder for [`AdmissionFlow`].
pub struct AdmissionFlowBuilder<S> {
    tenants: Option<Arc<dyn TenantStore>>,
    scheduler: Option<Arc<dyn SchedulerClient>>,
    cache: Option<Arc<InstanceCache>>,
    usage: Option<Arc<dyn UsageTracker>>,
    analytics: Option<Arc<dyn AnalyticsSink>>,
    telemetry: Option<Arc<dyn Telemetry>>,
    policy: AdmissionPolicy,
    spawner: S,
}

impl<S: Spawn> AdmissionFlowBuilder<S> {
    /// Start a builder with the default policy.
    pub fn new(spawner: S) -> Self {
        Self {
            tenants: None,
            scheduler: None,
            cache: None,
            usage: None,
            analytics: None,
            telemetry: None,
            policy: AdmissionPolicy::CheckThenCreate,
            spawner,
        }
    }

    /// Start a builder using the policy from `cfg`.
    pub fn from_config(cfg: &OrchestratorConfig, spawner: S) -> Self {
        Self::new(spawner).policy(cfg.admission.policy)
    }

    /// Set the tenant store.
    #[must_use]
    pub fn tenant_store(mut self, tenants: Arc<dyn TenantStore>) -> Self {
        self.tenants = Some(tenants);
        self
    }

    /// Set the scheduler client.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn SchedulerClient>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Set the instance cache.
    #[must_use]
    pub fn instance_cache(mut self, cache: Arc<InstanceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the usage tracker.
    #[must_use]
    pub fn usage_tracker(mut self, usage: Arc<dyn UsageTracker>) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Set the analytics sink. Defaults to [`TracingAnalyticsSink`].
    #[must_use]
    pub fn analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    /// Set the telemetry sink. Defaults to [`TracingTelemetry`].
    #[must_use]
    pub fn telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Set the ceiling policy.
    #[must_use]
    pub fn policy(mut self, policy: AdmissionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build the flow. Fails if a required collaborator is missing.
    pub fn build(self) -> AppResult<AdmissionFlow<S>> {
        Ok(AdmissionFlow {
            tenants: self.tenants.ok_or_else(|| anyhow!("tenant store is required"))?,
            scheduler: self
                .scheduler
                .ok_or_else(|| anyhow!("scheduler client is required"))?,
            cache: self
                .cache
                .ok_or_else(|| anyhow!("instance cache is required"))?,
            usage: self
                .usage
                .ok_or_else(|| anyhow!("usage tracker is required"))?,
            analytics: self
                .analytics
                .unwrap_or_else(|| Arc::new(TracingAnalyticsSink)),
            telemetry: self
                .telemetry
                .unwrap_or_else(|| Arc::new(TracingTelemetry)),
            policy: self.policy,
            spawner: self.spawner,
        })
    }
}
