//! Registry of live sandbox instances, indexed by team.
//!
//! Instances live in one sharded map keyed by sandbox ID; a second sharded map
//! indexes them by team and carries per-team reservations. Mutations for
//! unrelated sandboxes or teams do not serialize on a shared lock. A team entry
//! may be held while reading the instance map, never the other way round.
//!
//! Team counts only include instances that are present and not expired at read
//! time; an expired instance stops counting before the reaper removes it.
//!
//! `add` does not enforce a team ceiling. Callers check `count_for_team` first,
//! or take a [`Reservation`] with [`InstanceCache::try_reserve`] for strict
//! enforcement.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::error::CacheError;
use crate::core::spawn::Spawn;
use crate::util::{SandboxId, TeamId};

/// Sandbox descriptor returned by the cluster scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sandbox {
    /// Sandbox identity.
    pub sandbox_id: SandboxId,
    /// Template the sandbox was created from.
    pub template_id: String,
    /// First alias registered for the template, if any.
    pub alias: Option<String>,
    /// Node/client the sandbox runs on.
    pub client_id: String,
}

/// One cached instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    /// Scheduler descriptor.
    pub instance: Sandbox,
    /// Owning team.
    pub team_id: TeamId,
    /// Caller-supplied metadata.
    pub metadata: HashMap<String, String>,
    /// Creation time.
    pub started_at: SystemTime,
    /// Expiry; the instance is swept once this passes.
    pub end_time: SystemTime,
}

impl InstanceInfo {
    /// Whether the instance has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.end_time <= now
    }
}

/// Why an instance left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// Its end time passed.
    Expired,
    /// It was removed explicitly.
    Deleted,
}

/// Callback invoked after an instance leaves the cache.
pub type EvictionHandler = Arc<dyn Fn(&InstanceInfo, EvictionReason) + Send + Sync>;

#[derive(Debug, Default)]
struct TeamSlot {
    live: HashSet<SandboxId>,
    reserved: usize,
}

impl TeamSlot {
    fn occupied(&self) -> usize {
        self.live.len() + self.reserved
    }
}

/// Concurrency-safe cache of live sandbox instances.
pub struct InstanceCache {
    instances: DashMap<SandboxId, InstanceInfo>,
    teams: DashMap<TeamId, TeamSlot>,
    ttl: Duration,
    on_evict: Option<EvictionHandler>,
}

impl InstanceCache {
    /// Create a cache whose instances expire `ttl` after creation.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            instances: DashMap::new(),
            teams: DashMap::new(),
            ttl,
            on_evict: None,
        }
    }

    /// Create a cache with `shards` shards per map (power of two, greater than one).
    #[must_use]
    pub fn with_shards(ttl: Duration, shards: usize) -> Self {
        Self {
            instances: DashMap::with_shard_amount(shards),
            teams: DashMap::with_shard_amount(shards),
            ttl,
            on_evict: None,
        }
    }

    /// Invoke `handler` whenever an instance is removed or expires.
    #[must_use]
    pub fn with_eviction_handler(mut self, handler: EvictionHandler) -> Self {
        self.on_evict = Some(handler);
        self
    }

    /// Default lifetime of a new instance.
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Build a record for `instance` starting now and expiring after the cache TTL.
    pub fn record(
        &self,
        instance: Sandbox,
        team_id: TeamId,
        metadata: HashMap<String, String>,
    ) -> InstanceInfo {
        let started_at = SystemTime::now();
        InstanceInfo {
            instance,
            team_id,
            metadata,
            started_at,
            end_time: started_at + self.ttl,
        }
    }

    /// Insert a new instance.
    pub fn add(&self, info: InstanceInfo) -> Result<(), CacheError> {
        let id = info.instance.sandbox_id.clone();
        let team = info.team_id.clone();
        self.insert_instance(info)?;
        self.index_live(id, team, None);
        Ok(())
    }

    /// Insert a new instance, converting `reservation` into a live entry.
    ///
    /// On failure the reservation is dropped and its slot released.
    pub fn add_reserved(&self, mut reservation: Reservation<'_>, info: InstanceInfo) -> Result<(), CacheError> {
        let id = info.instance.sandbox_id.clone();
        let team = info.team_id.clone();
        self.insert_instance(info)?;
        self.index_live(id, team, Some(&mut reservation));
        Ok(())
    }

    /// Record `id` as live for `team`, consuming `reservation` if it is for that team.
    ///
    /// The instance is re-checked under the team entry, so a `remove` that ran
    /// after the insert cannot leave a stale ID behind.
    fn index_live(&self, id: SandboxId, team: TeamId, reservation: Option<&mut Reservation<'_>>) {
        let mut slot = self.teams.entry(team.clone()).or_default();
        if let Some(reservation) = reservation {
            if reservation.team == *slot.key() {
                slot.reserved = slot.reserved.saturating_sub(1);
                reservation.armed = false;
            }
        }
        if self
            .instances
            .get(&id)
            .is_some_and(|info| info.team_id == team)
        {
            slot.live.insert(id);
            return;
        }
        drop(slot);
        self.teams.remove_if(&team, |_, slot| slot.occupied() == 0);
    }

    fn insert_instance(&self, info: InstanceInfo) -> Result<(), CacheError> {
        match self.instances.entry(info.instance.sandbox_id.clone()) {
            Entry::Occupied(entry) => Err(CacheError::AlreadyExists(entry.key().clone())),
            Entry::Vacant(slot) => {
                slot.insert(info);
                Ok(())
            }
        }
    }

    /// Take a slot for `team` if its live plus reserved count is below `limit`.
    ///
    /// The check and the increment are atomic per team.
    pub fn try_reserve(&self, team: &TeamId, limit: usize) -> Option<Reservation<'_>> {
        let now = SystemTime::now();
        let mut slot = self.teams.entry(team.clone()).or_default();
        if self.live_count(&slot, now) + slot.reserved >= limit {
            return None;
        }
        slot.reserved += 1;
        Some(Reservation {
            cache: self,
            team: team.clone(),
            armed: true,
        })
    }

    fn release_reservation(&self, team: &TeamId) {
        if let Some(mut slot) = self.teams.get_mut(team) {
            slot.reserved = slot.reserved.saturating_sub(1);
        }
        self.teams.remove_if(team, |_, slot| slot.occupied() == 0);
    }

    /// Remove an instance explicitly.
    pub fn remove(&self, id: &str) -> Result<InstanceInfo, CacheError> {
        let (_, info) = self
            .instances
            .remove(id)
            .ok_or_else(|| CacheError::NotFound(SandboxId::from(id)))?;
        self.unindex(&info);
        self.evicted(&info, EvictionReason::Deleted);
        Ok(info)
    }

    fn unindex(&self, info: &InstanceInfo) {
        if let Some(mut slot) = self.teams.get_mut(&info.team_id) {
            slot.live.remove(&info.instance.sandbox_id);
        }
        self.teams.remove_if(&info.team_id, |_, slot| slot.occupied() == 0);
    }

    fn evicted(&self, info: &InstanceInfo, reason: EvictionReason) {
        tracing::debug!(
            sandbox_id = %info.instance.sandbox_id,
            team_id = %info.team_id,
            ?reason,
            "instance evicted"
        );
        if let Some(handler) = &self.on_evict {
            handler(info, reason);
        }
    }

    /// Instance by sandbox ID.
    pub fn get(&self, id: &str) -> Option<InstanceInfo> {
        self.instances.get(id).map(|entry| entry.value().clone())
    }

    /// Whether the sandbox is cached.
    pub fn exists(&self, id: &str) -> bool {
        self.instances.contains_key(id)
    }

    /// Number of cached instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Number of live (non-expired) instances owned by `team`.
    ///
    /// Reflects every completed `add`; admissions still in flight are not counted.
    pub fn count_for_team(&self, team: &TeamId) -> usize {
        let now = SystemTime::now();
        self.teams
            .get(team)
            .map_or(0, |slot| self.live_count(&slot, now))
    }

    fn live_count(&self, slot: &TeamSlot, now: SystemTime) -> usize {
        slot.live
            .iter()
            .filter(|id| {
                self.instances
                    .get(*id)
                    .is_some_and(|info| !info.is_expired(now))
            })
            .count()
    }

    /// Instances owned by `team`.
    pub fn list_for_team(&self, team: &TeamId) -> Vec<InstanceInfo> {
        let ids: Vec<SandboxId> = match self.teams.get(team) {
            Some(slot) => slot.live.iter().cloned().collect(),
            None => return Vec::new(),
        };
        ids.iter().filter_map(|id| self.get(id.as_str())).collect()
    }

    /// Move the expiry of an instance (keep-alive).
    pub fn update_end_time(&self, id: &str, end_time: SystemTime) -> Result<(), CacheError> {
        let mut entry = self
            .instances
            .get_mut(id)
            .ok_or_else(|| CacheError::NotFound(SandboxId::from(id)))?;
        entry.end_time = end_time;
        Ok(())
    }

    /// Replace the metadata of an instance.
    pub fn update_metadata(&self, id: &str, metadata: HashMap<String, String>) -> Result<(), CacheError> {
        let mut entry = self
            .instances
            .get_mut(id)
            .ok_or_else(|| CacheError::NotFound(SandboxId::from(id)))?;
        entry.metadata = metadata;
        Ok(())
    }

    /// Remove every instance expired at `now` and return them.
    ///
    /// An instance whose end time was extended after the scan is kept.
    pub fn sweep_expired(&self, now: SystemTime) -> Vec<InstanceInfo> {
        let candidates: Vec<SandboxId> = self
            .instances
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut expired = Vec::with_capacity(candidates.len());
        for id in candidates {
            if let Some((_, info)) = self.instances.remove_if(&id, |_, info| info.is_expired(now)) {
                self.unindex(&info);
                self.evicted(&info, EvictionReason::Expired);
                expired.push(info);
            }
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "swept expired instances");
        }
        expired
    }

    /// Sweep expired instances every `interval` until `cancel` fires.
    pub fn spawn_reaper<S: Spawn>(self: &Arc<Self>, spawner: &S, interval: Duration, cancel: CancellationToken) {
        let cache = Arc::clone(self);
        spawner.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        cache.sweep_expired(SystemTime::now());
                    }
                }
            }
            tracing::debug!("instance reaper stopped");
        });
    }
}

/// A slot held against a team's ceiling until converted or dropped.
#[must_use = "dropping a reservation releases it"]
pub struct Reservation<'a> {
    cache: &'a InstanceCache,
    team: TeamId,
    armed: bool,
}

impl Reservation<'_> {
    /// Team the slot is held for.
    pub const fn team(&self) -> &TeamId {
        &self.team
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.release_reservation(&self.team);
        }
    }
}

impl std::fmt::Debug for Reservation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("team", &self.team)
            .field("armed", &self.armed)
            .finish()
    }
}
