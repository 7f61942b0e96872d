//! Sandbox admission: authorize, check capacity, create, register, compensate.
//!
//! Under [`AdmissionPolicy::CheckThenCreate`] the capacity check reads
//! [`InstanceCache::count_for_team`] before the scheduler call and nothing holds
//! the team between that read and the cache insert. Admissions for one team
//! that run concurrently near the ceiling can therefore all pass the check; the
//! overrun is bounded by the number of such concurrent admissions. Admissions for
//! different teams never wait on each other.
//!
//! [`AdmissionPolicy::Reserve`] takes a per-team reservation atomically against
//! the ceiling before the scheduler call, which removes the overrun at the cost
//! of holding the slot for the duration of the call.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::analytics::{build_analytics_event, AnalyticsSink, CREATED_INSTANCE};
use crate::core::error::{
    AdmissionError, BoxError, CacheError, CompensationOutcome, TenantStoreError, UpstreamError,
};
use crate::core::instance_cache::{InstanceCache, Reservation, Sandbox};
use crate::core::spawn::Spawn;
use crate::util::telemetry::{Attribute, Telemetry};
use crate::util::{SandboxId, TeamId};

/// Service tier of a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Tier identity.
    pub id: String,
    /// Maximum simultaneous sandboxes.
    pub concurrent_instances: u32,
}

/// Requesting team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Team identity.
    pub id: TeamId,
    /// Display name.
    pub name: String,
    /// Service tier.
    pub tier: Tier,
}

/// Template (environment) record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvRecord {
    /// Template identity.
    pub template_id: String,
    /// Aliases the template can be requested by.
    pub aliases: Vec<String>,
    /// Whether every team may use it.
    pub public: bool,
    /// Owning team.
    pub team_id: TeamId,
}

/// Result of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCheck {
    /// Resolved template.
    pub env: EnvRecord,
    /// Kernel version the template was built with.
    pub kernel_version: String,
    /// Whether the team may use the template.
    pub has_access: bool,
}

/// Tenant/authorization store.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Resolve `env_id_or_alias` and check whether `team_id` may use it.
    async fn check_team_access_env(
        &self,
        env_id_or_alias: &str,
        team_id: &TeamId,
        require_access: bool,
    ) -> Result<AccessCheck, TenantStoreError>;
}

/// Arguments of a scheduler create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSandbox {
    /// Resolved template.
    pub template_id: String,
    /// First alias registered for the template.
    pub alias: Option<String>,
    /// Requesting team.
    pub team_id: TeamId,
    /// Caller-supplied metadata.
    pub metadata: HashMap<String, String>,
    /// Kernel version of the template.
    pub kernel_version: String,
}

/// Cluster scheduler client.
#[async_trait]
pub trait SchedulerClient: Send + Sync {
    /// Create a sandbox job.
    async fn create_sandbox(&self, request: &CreateSandbox) -> Result<Sandbox, UpstreamError>;
    /// Delete a sandbox job.
    async fn delete_instance(&self, id: &SandboxId, forced: bool) -> Result<(), UpstreamError>;
}

/// Records template usage.
#[async_trait]
pub trait UsageTracker: Send + Sync {
    /// Stamp the template as used now.
    async fn update_env_last_used(&self, template_id: &str) -> Result<(), BoxError>;
}

/// How the team ceiling is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// Read the live count before creating; accepts a bounded overrun.
    #[default]
    CheckThenCreate,
    /// Reserve a slot atomically before creating; no overrun.
    Reserve,
}

/// Request for a new sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SandboxRequest {
    /// Template ID or alias, uncleaned.
    pub template_id: String,
    /// Metadata attached to the instance.
    pub metadata: HashMap<String, String>,
}

/// Normalize a requested template ID or alias.
///
/// Trims whitespace, lower-cases, and requires at least one character of
/// `[a-z0-9_-]`.
pub fn clean_env_id(raw: &str) -> Result<String, String> {
    let cleaned = raw.trim().to_lowercase();
    if cleaned.is_empty() {
        return Err("environment ID must not be empty".into());
    }
    if let Some(bad) = cleaned
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_'))
    {
        return Err(format!("invalid character {bad:?} in environment ID"));
    }
    Ok(cleaned)
}

/// Combines access control, capacity check, scheduler call and cache registration.
pub struct AdmissionFlow<S> {
    pub(crate) tenants: Arc<dyn TenantStore>,
    pub(crate) scheduler: Arc<dyn SchedulerClient>,
    pub(crate) cache: Arc<InstanceCache>,
    pub(crate) usage: Arc<dyn UsageTracker>,
    pub(crate) analytics: Arc<dyn AnalyticsSink>,
    pub(crate) telemetry: Arc<dyn Telemetry>,
    pub(crate) policy: AdmissionPolicy,
    pub(crate) spawner: S,
}

impl<S: Spawn> AdmissionFlow<S> {
    /// Instance cache the flow registers into.
    pub fn cache(&self) -> &Arc<InstanceCache> {
        &self.cache
    }

    /// Active ceiling policy.
    pub const fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Admit a new sandbox for `team`.
    ///
    /// On a cache failure after the scheduler created the sandbox, the sandbox is
    /// deleted again (best effort) and [`AdmissionError::Registration`] carries
    /// both the cache error and the compensation outcome.
    pub async fn admit(&self, team: &Team, request: SandboxRequest) -> Result<Sandbox, AdmissionError> {
        self.telemetry
            .set_attributes(&[Attribute::new("env.team.id", &team.id)]);

        let env_id = clean_env_id(&request.template_id).map_err(|reason| {
            let err = AdmissionError::InvalidTemplate {
                template_id: request.template_id.clone(),
                reason,
            };
            self.telemetry.report_critical_error(&err);
            err
        })?;

        let access = self
            .tenants
            .check_team_access_env(&env_id, &team.id, true)
            .await
            .map_err(|source| {
                let err = AdmissionError::AccessCheck(source);
                self.telemetry.report_critical_error(&err);
                err
            })?;
        if !access.has_access {
            let err = AdmissionError::Forbidden {
                team_id: team.id.clone(),
                template_id: env_id,
            };
            self.telemetry.report_error(&err);
            return Err(err);
        }

        let template_id = access.env.template_id.clone();
        let alias = access.env.aliases.first().cloned();
        self.telemetry.set_attributes(&[
            Attribute::new("env.id", &template_id),
            Attribute::new("env.kernel.version", &access.kernel_version),
        ]);

        let reservation = self.check_capacity(team)?;
        self.telemetry.report_event("checked team access and capacity");

        let create = CreateSandbox {
            template_id: template_id.clone(),
            alias: alias.clone(),
            team_id: team.id.clone(),
            metadata: request.metadata,
            kernel_version: access.kernel_version,
        };
        let sandbox = self.scheduler.create_sandbox(&create).await.map_err(|source| {
            let err = AdmissionError::Upstream(source);
            if err.is_client_error() {
                self.telemetry.report_error(&err);
            } else {
                self.telemetry.report_critical_error(&err);
            }
            err
        })?;
        self.telemetry
            .set_attributes(&[Attribute::new("instance.id", &sandbox.sandbox_id)]);

        let info = self
            .cache
            .record(sandbox.clone(), team.id.clone(), create.metadata);
        let added = match reservation {
            Some(reservation) => self.cache.add_reserved(reservation, info),
            None => self.cache.add(info),
        };
        if let Err(source) = added {
            return Err(self.compensate(&sandbox, source).await);
        }

        tracing::info!(
            team_id = %team.id,
            sandbox_id = %sandbox.sandbox_id,
            template_id = %template_id,
            "created sandbox"
        );
        self.analytics.record(build_analytics_event(
            team.id.clone(),
            CREATED_INSTANCE,
            [
                ("environment", template_id.clone()),
                ("instance_id", sandbox.sandbox_id.to_string()),
                ("alias", alias.unwrap_or_default()),
            ],
        ));
        self.track_usage(template_id);

        Ok(sandbox)
    }

    fn check_capacity(&self, team: &Team) -> Result<Option<Reservation<'_>>, AdmissionError> {
        let limit = team.tier.concurrent_instances;
        let exceeded = || {
            let err = AdmissionError::CapacityExceeded {
                team_id: team.id.clone(),
                limit,
            };
            tracing::warn!(team_id = %team.id, limit, "team reached concurrent sandbox limit");
            self.telemetry.report_error(&err);
            err
        };

        match self.policy {
            AdmissionPolicy::CheckThenCreate => {
                let count = self.cache.count_for_team(&team.id);
                if count >= limit as usize {
                    return Err(exceeded());
                }
                Ok(None)
            }
            AdmissionPolicy::Reserve => self
                .cache
                .try_reserve(&team.id, limit as usize)
                .map(Some)
                .ok_or_else(exceeded),
        }
    }

    async fn compensate(&self, sandbox: &Sandbox, source: CacheError) -> AdmissionError {
        tracing::error!(sandbox_id = %sandbox.sandbox_id, error = %source, "error when adding instance to cache");
        self.telemetry.report_critical_error(&source);

        let compensation = match self.scheduler.delete_instance(&sandbox.sandbox_id, true).await {
            Ok(()) => {
                tracing::info!(sandbox_id = %sandbox.sandbox_id, "rolled back unregistered instance");
                CompensationOutcome::RolledBack
            }
            Err(err) => {
                tracing::error!(sandbox_id = %sandbox.sandbox_id, error = %err, "error when deleting unregistered instance");
                self.telemetry.report_critical_error(&err);
                CompensationOutcome::Leaked(err)
            }
        };
        AdmissionError::Registration {
            source,
            compensation,
        }
    }

    fn track_usage(&self, template_id: String) {
        let usage = Arc::clone(&self.usage);
        let telemetry = Arc::clone(&self.telemetry);
        self.spawner.spawn(async move {
            if let Err(err) = usage.update_env_last_used(&template_id).await {
                tracing::warn!(template_id = %template_id, error = %err, "error when updating last used for env");
                telemetry.report_error(err.as_ref());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_env_id_normalizes() {
        assert_eq!(clean_env_id("  Env-123 ").unwrap(), "env-123");
        assert_eq!(clean_env_id("base_v2").unwrap(), "base_v2");
    }

    #[test]
    fn clean_env_id_rejects_bad_input() {
        assert!(clean_env_id("   ").is_err());
        assert!(clean_env_id("env/123").is_err());
        assert!(clean_env_id("env 123").is_err());
    }

    #[test]
    fn policy_deserializes_snake_case() {
        let p: AdmissionPolicy = serde_json::from_str("\"reserve\"").unwrap();
        assert_eq!(p, AdmissionPolicy::Reserve);
        assert_eq!(AdmissionPolicy::default(), AdmissionPolicy::CheckThenCreate);
    }
}
