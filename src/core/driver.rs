//! Driver lifecycle facade: start, wait, stop, destroy, stats and recovery.
//!
//! A [`Driver`] is generic over a [`JobKind`], which supplies the decoded
//! configuration type and the payload. All job kinds share the same handle,
//! store and state machine.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::core::error::{BoxError, DriverError};
use crate::core::handle::{ExitResult, Job, TaskHandle};
use crate::core::spawn::Spawn;
use crate::core::stats::TaskResourceUsage;
use crate::core::store::TaskStore;
use crate::util::telemetry::{Attribute, Telemetry};
use crate::util::TaskId;

/// Job configuration supplied by the scheduler plugin framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Job identity.
    pub id: TaskId,
    /// Allocation the job belongs to.
    pub alloc_id: String,
    /// Environment passed to the job.
    pub env: BTreeMap<String, String>,
    /// Undecoded job-kind configuration.
    pub driver_config: serde_json::Value,
}

impl TaskConfig {
    /// Configuration with the given ID and nothing else.
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            alloc_id: String::new(),
            env: BTreeMap::new(),
            driver_config: serde_json::Value::Null,
        }
    }

    /// Set the allocation ID.
    #[must_use]
    pub fn with_alloc_id(mut self, alloc_id: impl Into<String>) -> Self {
        self.alloc_id = alloc_id.into();
        self
    }

    /// Add one environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the job-kind configuration.
    #[must_use]
    pub fn with_driver_config(mut self, driver_config: serde_json::Value) -> Self {
        self.driver_config = driver_config;
        self
    }

    /// Decode the job-kind configuration.
    pub fn decode_driver_config<T: DeserializeOwned>(&self) -> Result<T, DriverError> {
        T::deserialize(&self.driver_config).map_err(DriverError::DecodeConfig)
    }

    /// Environment variable, empty when unset.
    pub fn env_var(&self, key: &str) -> &str {
        self.env.get(key).map_or("", String::as_str)
    }
}

/// Restart-safe snapshot of a handle's public state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverTaskState {
    /// Configuration the job was started with.
    pub task_config: TaskConfig,
    /// Start time, rounded to milliseconds.
    pub started_at: SystemTime,
}

/// Handle returned to the framework by `start_task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverHandle {
    /// Handle format version of the job kind.
    pub version: u32,
    /// Configuration the job was started with.
    pub config: TaskConfig,
    /// Encoded [`DriverTaskState`].
    pub driver_state: Vec<u8>,
}

impl DriverHandle {
    /// Handle with an empty driver state.
    pub const fn new(version: u32, config: TaskConfig) -> Self {
        Self {
            version,
            config,
            driver_state: Vec::new(),
        }
    }

    /// Encode `state` into the handle.
    pub fn set_driver_state<T: Serialize>(&mut self, state: &T) -> Result<(), DriverError> {
        self.driver_state = serde_json::to_vec(state).map_err(DriverError::DriverState)?;
        Ok(())
    }

    /// Decode the stored state.
    pub fn driver_state<T: DeserializeOwned>(&self) -> Result<T, DriverError> {
        serde_json::from_slice(&self.driver_state).map_err(DriverError::DriverState)
    }
}

/// Network information published by a job. These jobs publish none.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DriverNetwork {
    /// Address the job listens on.
    pub ip: String,
    /// Named ports.
    pub port_map: BTreeMap<String, u16>,
}

/// A kind of driver-managed job.
#[async_trait]
pub trait JobKind: Send + Sync + 'static {
    /// Decoded `driver_config`.
    type Config: DeserializeOwned + Debug + Send;
    /// Payload held by the handle.
    type Extra: Job;

    /// Name used in logs.
    const NAME: &'static str;
    /// Version stamped on every [`DriverHandle`].
    const HANDLE_VERSION: u32 = 1;

    /// Reject configurations the job cannot run with.
    fn validate(_config: &Self::Config) -> Result<(), String> {
        Ok(())
    }

    /// Build the payload, opening any resources it needs.
    async fn prepare(
        &self,
        task: &TaskConfig,
        config: Self::Config,
        telemetry: &dyn Telemetry,
    ) -> Result<Self::Extra, BoxError>;
}

/// Lifecycle facade driven by the scheduler plugin framework.
pub struct Driver<K: JobKind, S> {
    kind: K,
    tasks: TaskStore<TaskHandle<K::Extra>>,
    scope: CancellationToken,
    spawner: S,
    telemetry: Arc<dyn Telemetry>,
    stats_buffer: usize,
    stats_interval: Duration,
}

impl<K: JobKind, S: Spawn> Driver<K, S> {
    /// Create a driver. Every handle scope is a child of `scope`.
    pub fn new(kind: K, spawner: S, scope: CancellationToken, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            kind,
            tasks: TaskStore::new(),
            scope,
            spawner,
            telemetry,
            stats_buffer: 16,
            stats_interval: Duration::from_secs(1),
        }
    }

    /// Use a store with `shards` shards.
    #[must_use]
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.tasks = TaskStore::with_shards(shards);
        self
    }

    /// Capacity of each stats feed channel.
    #[must_use]
    pub fn with_stats_buffer(mut self, stats_buffer: usize) -> Self {
        self.stats_buffer = stats_buffer.max(1);
        self
    }

    /// Sampling interval used when a stats request does not name one.
    #[must_use]
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Default stats sampling interval.
    pub const fn stats_interval(&self) -> Duration {
        self.stats_interval
    }

    /// Tracked jobs.
    pub const fn tasks(&self) -> &TaskStore<TaskHandle<K::Extra>> {
        &self.tasks
    }

    /// Look up a tracked handle.
    pub fn get(&self, id: &str) -> Option<Arc<TaskHandle<K::Extra>>> {
        self.tasks.get(id)
    }

    /// Start a job.
    ///
    /// Nothing is registered unless every step up to registration succeeded.
    pub async fn start_task(
        &self,
        config: TaskConfig,
    ) -> Result<(DriverHandle, Option<DriverNetwork>), DriverError> {
        if self.tasks.contains(config.id.as_str()) {
            return Err(DriverError::AlreadyStarted(config.id));
        }

        self.telemetry
            .set_attributes(&[Attribute::new("alloc.id", &config.alloc_id)]);

        let handle = self.prepare_handle(config, SystemTime::now()).await?;

        let state = DriverTaskState {
            task_config: handle.config().clone(),
            started_at: handle.started_at(),
        };
        let mut driver_handle = DriverHandle::new(K::HANDLE_VERSION, handle.config().clone());
        if let Err(err) = driver_handle.set_driver_state(&state) {
            tracing::error!(task_id = %handle.config().id, error = %err, "failed to start task, error setting driver state");
            self.telemetry.report_critical_error(&err);
            self.discard(&handle);
            return Err(err);
        }

        self.register(&handle)?;
        Ok((driver_handle, None))
    }

    /// Re-register a job known to the framework after a restart.
    ///
    /// A job that is already tracked is left alone.
    pub async fn recover_task(&self, driver_handle: &DriverHandle) -> Result<(), DriverError> {
        if self.tasks.contains(driver_handle.config.id.as_str()) {
            return Ok(());
        }
        let state: DriverTaskState = driver_handle.driver_state()?;
        tracing::info!(task_id = %state.task_config.id, kind = K::NAME, "recovering task");

        let handle = self.prepare_handle(state.task_config, state.started_at).await?;
        match self.register(&handle) {
            Err(DriverError::AlreadyStarted(_)) => Ok(()),
            other => other,
        }
    }

    async fn prepare_handle(
        &self,
        config: TaskConfig,
        started_at: SystemTime,
    ) -> Result<Arc<TaskHandle<K::Extra>>, DriverError> {
        let decoded: K::Config = match config.decode_driver_config() {
            Ok(decoded) => decoded,
            Err(err) => {
                self.telemetry.report_critical_error(&err);
                return Err(err);
            }
        };
        if let Err(reason) = K::validate(&decoded) {
            let err = DriverError::InvalidConfig(reason);
            self.telemetry.report_critical_error(&err);
            return Err(err);
        }

        tracing::info!(task_id = %config.id, kind = K::NAME, task_cfg = ?decoded, "starting task");

        let extra = match self.kind.prepare(&config, decoded, self.telemetry.as_ref()).await {
            Ok(extra) => extra,
            Err(source) => {
                let err = DriverError::Prepare(source);
                self.telemetry.report_critical_error(&err);
                return Err(err);
            }
        };

        Ok(Arc::new(TaskHandle::new(
            config,
            started_at,
            self.scope.child_token(),
            extra,
        )))
    }

    fn register(&self, handle: &Arc<TaskHandle<K::Extra>>) -> Result<(), DriverError> {
        let id = handle.config().id.clone();
        if !self.tasks.insert_new(id.clone(), Arc::clone(handle)) {
            tracing::warn!(task_id = %id, "concurrent start lost registration race");
            self.discard(handle);
            return Err(DriverError::AlreadyStarted(id));
        }

        let runner = Arc::clone(handle);
        self.spawner.spawn(async move {
            runner.run().await;
        });
        Ok(())
    }

    fn discard(&self, handle: &TaskHandle<K::Extra>) {
        if let Err(err) = handle.destroy(true) {
            tracing::warn!(task_id = %handle.config().id, error = %err, "failed to release unregistered task");
            self.telemetry.report_error(&err);
        }
    }

    /// Resolve with the exit result once the job finishes.
    ///
    /// Cancelling `caller` (or the driver scope) abandons the wait, not the job;
    /// the receiver then observes a closed channel.
    pub fn wait_task(
        &self,
        id: &str,
        caller: CancellationToken,
    ) -> Result<oneshot::Receiver<ExitResult>, DriverError> {
        let handle = self.tasks.get(id).ok_or(DriverError::TaskNotFound)?;
        let (tx, rx) = oneshot::channel();
        let scope = self.scope.clone();

        self.spawner.spawn(async move {
            tokio::select! {
                biased;
                result = handle.wait() => {
                    let _ = tx.send(result);
                }
                () = caller.cancelled() => {}
                () = scope.cancelled() => {}
            }
        });
        Ok(rx)
    }

    /// Request cancellation and return immediately.
    ///
    /// `timeout` and `signal` are advisory; enforcing a hard kill is up to the job.
    pub fn stop_task(&self, id: &str, timeout: Duration, signal: &str) -> Result<(), DriverError> {
        let handle = self.tasks.get(id).ok_or(DriverError::TaskNotFound)?;
        tracing::debug!(task_id = %id, timeout_ms = timeout.as_millis(), signal, "stopping task");
        handle.cancel();
        Ok(())
    }

    /// Release the job's resources and stop tracking it.
    pub fn destroy_task(&self, id: &str, force: bool) -> Result<(), DriverError> {
        let handle = self.tasks.get(id).ok_or(DriverError::TaskNotFound)?;
        if let Err(err) = handle.destroy(force) {
            if matches!(err, DriverError::Release(_)) {
                self.telemetry.report_error(&err);
            }
            return Err(err);
        }
        if !self.tasks.delete_if(id, &handle) {
            tracing::debug!(task_id = %id, "task entry already removed or replaced");
        }
        tracing::info!(task_id = %id, force, "task destroyed");
        Ok(())
    }

    /// Live resource-usage feed sampled every `interval`.
    ///
    /// A zero `interval` selects the driver's configured stats interval.
    /// Ends when the job stops running, `caller` or the driver scope is
    /// cancelled, or the receiver is dropped. A slow consumer misses samples
    /// rather than stalling the feed.
    pub fn task_stats(
        &self,
        id: &str,
        interval: Duration,
        caller: CancellationToken,
    ) -> Result<mpsc::Receiver<TaskResourceUsage>, DriverError> {
        let Some(handle) = self.tasks.get(id) else {
            let err = DriverError::TaskNotFound;
            self.telemetry.report_critical_error(&err);
            return Err(err);
        };
        let interval = if interval.is_zero() {
            self.stats_interval
        } else {
            interval
        };
        let (tx, rx) = mpsc::channel(self.stats_buffer);
        let scope = self.scope.clone();

        self.spawner.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    () = caller.cancelled() => break,
                    () = scope.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if !handle.is_running() {
                    break;
                }
                match tx.try_send(handle.extra().resource_usage()) {
                    Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });
        Ok(rx)
    }

    /// Cancel the driver scope and with it every handle scope.
    pub fn shutdown(&self) {
        tracing::info!(kind = K::NAME, tracked = self.tasks.len(), "driver shutting down");
        self.scope.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_driver_config_reports_errors() {
        #[derive(Debug, Deserialize)]
        struct Cfg {
            #[serde(rename = "TemplateID")]
            template_id: String,
        }

        let ok = TaskConfig::new("t").with_driver_config(serde_json::json!({"TemplateID": "tpl"}));
        assert_eq!(ok.decode_driver_config::<Cfg>().unwrap().template_id, "tpl");

        let bad = TaskConfig::new("t").with_driver_config(serde_json::json!({"TemplateID": 1}));
        assert!(matches!(
            bad.decode_driver_config::<Cfg>(),
            Err(DriverError::DecodeConfig(_))
        ));
    }

    #[test]
    fn driver_state_round_trips_exactly() {
        let config = TaskConfig::new("t").with_env("BUCKET_NAME", "b");
        let state = DriverTaskState {
            task_config: config.clone(),
            started_at: crate::util::clock::round_to_millis(SystemTime::now()),
        };
        let mut handle = DriverHandle::new(1, config);
        handle.set_driver_state(&state).unwrap();
        let back: DriverTaskState = handle.driver_state().unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn env_var_defaults_to_empty() {
        let config = TaskConfig::new("t").with_env("REGION", "eu");
        assert_eq!(config.env_var("REGION"), "eu");
        assert_eq!(config.env_var("PROJECT_ID"), "");
    }
}
