//! Tests for component builders

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sandbox_orchestrator::builders::{build_driver, AdmissionFlowBuilder};
use sandbox_orchestrator::config::OrchestratorConfig;
use sandbox_orchestrator::core::jobs::TemplateBuild;
use sandbox_orchestrator::core::{AdmissionPolicy, InstanceCache, Spawn};
use sandbox_orchestrator::infra::{
    InMemoryScheduler, InMemoryTemplateBuilder, InMemoryTenantStore, InMemoryUsageTracker,
};
use sandbox_orchestrator::util::TracingTelemetry;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct NoopSpawner;

impl Spawn for NoopSpawner {
    fn spawn<F>(&self, _fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
    }
}

#[test]
fn test_admission_builder_requires_collaborators() {
    let err = AdmissionFlowBuilder::new(NoopSpawner).build().err().unwrap();
    assert!(err.to_string().contains("tenant store"));

    let err = AdmissionFlowBuilder::new(NoopSpawner)
        .tenant_store(Arc::new(InMemoryTenantStore::new()))
        .scheduler(Arc::new(InMemoryScheduler::new()))
        .instance_cache(Arc::new(InstanceCache::new(Duration::from_secs(60))))
        .build()
        .err()
        .unwrap();
    assert!(err.to_string().contains("usage tracker"));
}

#[test]
fn test_admission_builder_takes_policy_from_config() {
    let mut cfg = OrchestratorConfig::default();
    cfg.admission.policy = AdmissionPolicy::Reserve;
    let flow = AdmissionFlowBuilder::from_config(&cfg, NoopSpawner)
        .tenant_store(Arc::new(InMemoryTenantStore::new()))
        .scheduler(Arc::new(InMemoryScheduler::new()))
        .instance_cache(Arc::new(InstanceCache::new(Duration::from_secs(60))))
        .usage_tracker(Arc::new(InMemoryUsageTracker::new()))
        .build()
        .unwrap();
    assert_eq!(flow.policy(), AdmissionPolicy::Reserve);
    assert!(flow.cache().is_empty());
}

#[test]
fn test_build_driver_validates_config() {
    let builder = Arc::new(InMemoryTemplateBuilder::new(Duration::from_millis(1)));
    let mut cfg = OrchestratorConfig::default();
    cfg.driver.shards = 8;
    let driver = build_driver(
        TemplateBuild::new(builder.clone()),
        &cfg,
        NoopSpawner,
        CancellationToken::new(),
        Arc::new(TracingTelemetry),
    )
    .unwrap();
    assert!(driver.tasks().is_empty());

    cfg.driver.stats_buffer = 0;
    let result = build_driver(
        TemplateBuild::new(builder),
        &cfg,
        NoopSpawner,
        CancellationToken::new(),
        Arc::new(TracingTelemetry),
    );
    assert!(result.is_err());
}

#[test]
fn test_build_driver_applies_stats_interval() {
    let mut cfg = OrchestratorConfig::default();
    cfg.driver.stats_interval_ms = 250;
    let driver = build_driver(
        TemplateBuild::new(Arc::new(InMemoryTemplateBuilder::new(Duration::from_millis(1)))),
        &cfg,
        NoopSpawner,
        CancellationToken::new(),
        Arc::new(TracingTelemetry),
    )
    .unwrap();
    assert_eq!(driver.stats_interval(), Duration::from_millis(250));

    cfg.driver.stats_interval_ms = 0;
    let result = build_driver(
        TemplateBuild::new(Arc::new(InMemoryTemplateBuilder::new(Duration::from_millis(1)))),
        &cfg,
        NoopSpawner,
        CancellationToken::new(),
        Arc::new(TracingTelemetry),
    );
    assert!(result.is_err());
}
