//! Tests for configuration loading and validation

use std::collections::HashMap;
use std::time::Duration;

use sandbox_orchestrator::config::OrchestratorConfig;
use sandbox_orchestrator::core::AdmissionPolicy;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_from_lookup_defaults() {
    let cfg = OrchestratorConfig::from_lookup(lookup(&[])).unwrap();
    assert_eq!(cfg, OrchestratorConfig::default());
    assert_eq!(cfg.admission.policy, AdmissionPolicy::CheckThenCreate);
}

#[test]
fn test_from_lookup_overrides() {
    let cfg = OrchestratorConfig::from_lookup(lookup(&[
        ("DRIVER_STATS_INTERVAL_MS", "250"),
        ("SANDBOX_INSTANCE_TTL_SECS", "60"),
        ("SANDBOX_CACHE_SWEEP_SECS", "2"),
        ("SANDBOX_CACHE_SHARDS", "32"),
        ("SANDBOX_ADMISSION_POLICY", "reserve"),
    ]))
    .unwrap();
    assert_eq!(cfg.driver.stats_interval(), Duration::from_millis(250));
    assert_eq!(cfg.instance_cache.ttl(), Duration::from_secs(60));
    assert_eq!(cfg.instance_cache.sweep_interval(), Duration::from_secs(2));
    assert_eq!(cfg.instance_cache.shards, 32);
    assert_eq!(cfg.driver.shards, 32);
    assert_eq!(cfg.admission.policy, AdmissionPolicy::Reserve);
}

#[test]
fn test_from_lookup_rejects_malformed_values() {
    assert!(OrchestratorConfig::from_lookup(lookup(&[("SANDBOX_INSTANCE_TTL_SECS", "soon")])).is_err());
    assert!(OrchestratorConfig::from_lookup(lookup(&[("SANDBOX_ADMISSION_POLICY", "lottery")])).is_err());
    assert!(OrchestratorConfig::from_lookup(lookup(&[("SANDBOX_CACHE_SHARDS", "6")])).is_err());
    assert!(OrchestratorConfig::from_lookup(lookup(&[("DRIVER_STATS_INTERVAL_MS", "0")])).is_err());
}

#[test]
fn test_from_json_str_partial() {
    let cfg = OrchestratorConfig::from_json_str(
        r#"{"instance_cache": {"ttl_secs": 30}, "admission": {"policy": "reserve"}}"#,
    )
    .unwrap();
    assert_eq!(cfg.instance_cache.ttl_secs, 30);
    assert_eq!(cfg.instance_cache.sweep_interval_secs, 5);
    assert_eq!(cfg.admission.policy, AdmissionPolicy::Reserve);
    assert_eq!(cfg.driver.stats_buffer, 16);
}

#[test]
fn test_from_json_str_invalid() {
    assert!(OrchestratorConfig::from_json_str("{not json").is_err());
    let err = OrchestratorConfig::from_json_str(r#"{"driver": {"stats_buffer": 0}}"#).unwrap_err();
    assert!(err.contains("stats_buffer"));
}
