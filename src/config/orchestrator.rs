//! Orchestrator configuration: driver, instance cache and admission settings.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::error::AppResult;
use crate::core::AdmissionPolicy;

/// Driver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Default sampling interval of the stats feed in milliseconds.
    pub stats_interval_ms: u64,
    /// Capacity of each stats feed channel.
    pub stats_buffer: usize,
    /// Shards of the task store.
    pub shards: usize,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            stats_interval_ms: 1_000,
            stats_buffer: 16,
            shards: default_shards(),
        }
    }
}

impl DriverSettings {
    /// Stats interval as a duration.
    #[must_use]
    pub const fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    /// Validate driver settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.stats_interval_ms == 0 {
            return Err("stats_interval_ms must be greater than 0".into());
        }
        if self.stats_buffer == 0 {
            return Err("stats_buffer must be greater than 0".into());
        }
        validate_shards(self.shards)
    }
}

/// Instance cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceCacheSettings {
    /// Lifetime of a new instance in seconds.
    pub ttl_secs: u64,
    /// Interval of the expiry sweep in seconds.
    pub sweep_interval_secs: u64,
    /// Shards of the instance and team maps.
    pub shards: usize,
}

impl Default for InstanceCacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 15 * 60,
            sweep_interval_secs: 5,
            shards: default_shards(),
        }
    }
}

impl InstanceCacheSettings {
    /// Instance lifetime as a duration.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Sweep interval as a duration.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate cache settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_secs == 0 {
            return Err("ttl_secs must be greater than 0".into());
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be greater than 0".into());
        }
        validate_shards(self.shards)
    }
}

/// Admission settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionSettings {
    /// Ceiling enforcement policy.
    pub policy: AdmissionPolicy,
}

/// Root orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Driver settings.
    pub driver: DriverSettings,
    /// Instance cache settings.
    pub instance_cache: InstanceCacheSettings,
    /// Admission settings.
    pub admission: AdmissionSettings,
}

impl OrchestratorConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.driver
            .validate()
            .map_err(|e| format!("driver invalid: {e}"))?;
        self.instance_cache
            .validate()
            .map_err(|e| format!("instance_cache invalid: {e}"))?;
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the process environment, reading `.env` first if present.
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from `lookup`, falling back to defaults for missing keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let mut cfg = Self::default();
        if let Some(v) = parse_var(&lookup, "DRIVER_STATS_INTERVAL_MS")? {
            cfg.driver.stats_interval_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "SANDBOX_INSTANCE_TTL_SECS")? {
            cfg.instance_cache.ttl_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "SANDBOX_CACHE_SWEEP_SECS")? {
            cfg.instance_cache.sweep_interval_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "SANDBOX_CACHE_SHARDS")? {
            cfg.instance_cache.shards = v;
            cfg.driver.shards = v;
        }
        if let Some(raw) = lookup("SANDBOX_ADMISSION_POLICY") {
            cfg.admission.policy = match raw.trim() {
                "check_then_create" => AdmissionPolicy::CheckThenCreate,
                "reserve" => AdmissionPolicy::Reserve,
                other => anyhow::bail!("SANDBOX_ADMISSION_POLICY: unknown policy `{other}`"),
            };
        }
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> AppResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("{key}: invalid value `{raw}`")))
        .transpose()
}

fn default_shards() -> usize {
    (num_cpus::get() * 4).next_power_of_two().max(2)
}

fn validate_shards(shards: usize) -> Result<(), String> {
    if shards < 2 || !shards.is_power_of_two() {
        return Err(format!("shards must be a power of two greater than 1, got {shards}"));
    }
    Ok(())
}
