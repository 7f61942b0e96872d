//! In-memory tenant store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{AccessCheck, EnvRecord, TenantStore, TenantStoreError};
use crate::util::TeamId;

struct StoredEnv {
    env: EnvRecord,
    kernel_version: String,
}

/// Tenant store holding templates, aliases and explicit grants in memory.
#[derive(Default)]
pub struct InMemoryTenantStore {
    envs: Mutex<HashMap<String, StoredEnv>>,
    aliases: Mutex<HashMap<String, String>>,
    grants: Mutex<HashSet<(TeamId, String)>>,
    failure: Mutex<Option<String>>,
    lookups: AtomicUsize,
}

impl InMemoryTenantStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template and its aliases.
    pub fn add_env(&self, env: EnvRecord, kernel_version: impl Into<String>) {
        {
            let mut aliases = self.aliases.lock();
            for alias in &env.aliases {
                aliases.insert(alias.clone(), env.template_id.clone());
            }
        }
        self.envs.lock().insert(
            env.template_id.clone(),
            StoredEnv {
                env,
                kernel_version: kernel_version.into(),
            },
        );
    }

    /// Allow `team` to use a private template it does not own.
    pub fn grant(&self, team: TeamId, template_id: impl Into<String>) {
        self.grants.lock().insert((team, template_id.into()));
    }

    /// Make lookups fail with `message` (`None` to succeed again).
    pub fn fail_with(&self, message: Option<String>) {
        *self.failure.lock() = message;
    }

    /// Number of access checks performed.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn check_team_access_env(
        &self,
        env_id_or_alias: &str,
        team_id: &TeamId,
        _require_access: bool,
    ) -> Result<AccessCheck, TenantStoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failure.lock().clone() {
            return Err(TenantStoreError(message));
        }

        let template_id = self
            .aliases
            .lock()
            .get(env_id_or_alias)
            .cloned()
            .unwrap_or_else(|| env_id_or_alias.to_owned());
        let envs = self.envs.lock();
        let stored = envs
            .get(&template_id)
            .ok_or_else(|| TenantStoreError(format!("env \"{env_id_or_alias}\" not found")))?;

        let has_access = stored.env.public
            || stored.env.team_id == *team_id
            || self
                .grants
                .lock()
                .contains(&(team_id.clone(), template_id.clone()));
        Ok(AccessCheck {
            env: stored.env.clone(),
            kernel_version: stored.kernel_version.clone(),
            has_access,
        })
    }
}
