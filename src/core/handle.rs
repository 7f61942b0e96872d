//! Task handle: one managed job with a cancellable scope and a lifecycle state machine.
//!
//! A handle moves `Running -> Exited -> Destroyed` and never backward. The
//! payload (`extra`) is owned by the handle and released on destroy.

use std::time::{Instant, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::core::driver::TaskConfig;
use crate::core::error::{DriverError, ReleaseError};
use crate::core::stats::TaskResourceUsage;
use crate::util::clock::round_to_millis;

/// Lifecycle state of a task handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Background work is in progress.
    Running,
    /// Background work finished; resources may still be held.
    Exited,
    /// Resources released; terminal.
    Destroyed,
}

/// Exit result delivered to waiters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExitResult {
    /// Process-style exit code, zero on success.
    pub exit_code: i32,
    /// Signal that terminated the job, zero if none.
    pub signal: i32,
    /// Whether the job was killed for exceeding memory.
    pub oom_killed: bool,
    /// Error description when the job failed.
    pub err: Option<String>,
}

impl ExitResult {
    /// Successful completion.
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    /// Failed completion carrying an error description.
    pub fn failed(err: impl std::fmt::Display) -> Self {
        Self {
            exit_code: 1,
            err: Some(err.to_string()),
            ..Self::default()
        }
    }

    /// Completion caused by cancellation of the task scope.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::failed("task cancelled")
    }

    /// Whether the job finished without error.
    #[must_use]
    pub const fn successful(&self) -> bool {
        self.exit_code == 0 && self.err.is_none()
    }
}

/// Capability for payloads that own external resources.
pub trait ReleaseResources: Send + Sync {
    /// Release everything the payload owns. Called once per successful destroy.
    fn release(&self) -> Result<(), ReleaseError> {
        Ok(())
    }
}

/// Job-specific payload executed by a task handle.
#[async_trait]
pub trait Job: ReleaseResources + 'static {
    /// Execute the job. Must observe `cancel` at bounded intervals.
    async fn run(&self, cancel: CancellationToken) -> ExitResult;

    /// Current resource usage, sampled by the stats feed.
    fn resource_usage(&self) -> TaskResourceUsage {
        TaskResourceUsage::idle()
    }
}

/// One managed job.
pub struct TaskHandle<E> {
    config: TaskConfig,
    started_at: SystemTime,
    started: Instant,
    state: Mutex<TaskState>,
    cancel: CancellationToken,
    exited: watch::Sender<Option<ExitResult>>,
    extra: E,
}

impl<E: Job> TaskHandle<E> {
    /// Create a handle in `Running` state.
    ///
    /// `cancel` is the handle's own scope, normally a child of the driver scope.
    pub fn new(config: TaskConfig, started_at: SystemTime, cancel: CancellationToken, extra: E) -> Self {
        let (exited, _) = watch::channel(None);
        Self {
            config,
            started_at: round_to_millis(started_at),
            started: Instant::now(),
            state: Mutex::new(TaskState::Running),
            cancel,
            exited,
            extra,
        }
    }

    /// Framework-supplied task configuration.
    pub const fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Start time, rounded to milliseconds.
    pub const fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Job payload.
    pub const fn extra(&self) -> &E {
        &self.extra
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    /// Whether background work is still in progress.
    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    /// Exit result, once the job has finished.
    pub fn exit_result(&self) -> Option<ExitResult> {
        self.exited.borrow().clone()
    }

    /// Request cooperative termination. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the handle scope has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Execute the payload under the handle scope and fire the completion signal.
    ///
    /// Returns once the payload finished or the scope was cancelled. The scope
    /// is cancelled on return so nothing derived from it outlives the run.
    pub async fn run(&self) {
        let scope = self.cancel.clone();
        let result = tokio::select! {
            biased;
            () = scope.cancelled() => ExitResult::cancelled(),
            result = self.extra.run(scope.child_token()) => result,
        };
        tracing::debug!(
            task_id = %self.config.id,
            exit_code = result.exit_code,
            elapsed_ms = self.started.elapsed().as_millis(),
            "task finished"
        );
        self.finish(result);
        scope.cancel();
    }

    fn finish(&self, result: ExitResult) {
        {
            let mut state = self.state.lock();
            if *state == TaskState::Running {
                *state = TaskState::Exited;
            }
        }
        self.exited.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(result);
            true
        });
    }

    /// Wait for the exit result.
    pub async fn wait(&self) -> ExitResult {
        let mut rx = self.exited.subscribe();
        let result = match rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        result.unwrap_or_else(ExitResult::cancelled)
    }

    /// Release payload resources and mark the handle `Destroyed`.
    ///
    /// Without `force` a running handle is rejected with [`DriverError::StillRunning`].
    /// The scope is always cancelled before release. On a release failure the
    /// handle keeps its state so the call can be retried. Destroying an already
    /// destroyed handle is a no-op.
    pub fn destroy(&self, force: bool) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        match *state {
            TaskState::Destroyed => return Ok(()),
            TaskState::Running if !force => return Err(DriverError::StillRunning),
            TaskState::Running | TaskState::Exited => {}
        }
        self.cancel.cancel();
        self.extra.release()?;
        *state = TaskState::Destroyed;
        Ok(())
    }
}

impl<E> std::fmt::Debug for TaskHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.config.id)
            .field("started_at", &self.started_at)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct Sleeper {
        for_ms: u64,
        released: AtomicUsize,
        fail_release: bool,
    }

    impl Sleeper {
        fn new(for_ms: u64) -> Self {
            Self {
                for_ms,
                released: AtomicUsize::new(0),
                fail_release: false,
            }
        }
    }

    impl ReleaseResources for Sleeper {
        fn release(&self) -> Result<(), ReleaseError> {
            self.released.fetch_add(1, Ordering::SeqCst);
            if self.fail_release {
                return Err(ReleaseError::new("test resource", "close failed"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Job for Sleeper {
        async fn run(&self, cancel: CancellationToken) -> ExitResult {
            tokio::select! {
                () = cancel.cancelled() => ExitResult::cancelled(),
                () = tokio::time::sleep(Duration::from_millis(self.for_ms)) => ExitResult::success(),
            }
        }
    }

    fn handle(job: Sleeper) -> Arc<TaskHandle<Sleeper>> {
        Arc::new(TaskHandle::new(
            TaskConfig::new("task-1"),
            SystemTime::now(),
            CancellationToken::new(),
            job,
        ))
    }

    #[tokio::test]
    async fn run_moves_to_exited_and_signals() {
        let h = handle(Sleeper::new(5));
        assert_eq!(h.state(), TaskState::Running);
        h.run().await;
        assert_eq!(h.state(), TaskState::Exited);
        assert!(h.exit_result().is_some_and(|r| r.successful()));
        assert!(h.wait().await.successful());
        assert!(h.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_unwinds_run() {
        let h = handle(Sleeper::new(60_000));
        let runner = Arc::clone(&h);
        let join = tokio::spawn(async move { runner.run().await });
        h.cancel();
        h.cancel();
        join.await.unwrap();
        assert_eq!(h.wait().await, ExitResult::cancelled());
        assert_eq!(h.state(), TaskState::Exited);
    }

    #[tokio::test]
    async fn destroy_requires_exit_unless_forced() {
        let h = handle(Sleeper::new(60_000));
        assert!(matches!(h.destroy(false), Err(DriverError::StillRunning)));
        assert_eq!(h.state(), TaskState::Running);
        assert!(!h.is_cancelled());

        h.destroy(true).unwrap();
        assert_eq!(h.state(), TaskState::Destroyed);
        assert!(h.is_cancelled());
        assert_eq!(h.extra().released.load(Ordering::SeqCst), 1);

        h.destroy(true).unwrap();
        assert_eq!(h.extra().released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn state_never_moves_backward() {
        let h = handle(Sleeper::new(60_000));
        h.destroy(true).unwrap();
        h.run().await;
        assert_eq!(h.state(), TaskState::Destroyed);
        assert!(h.exit_result().is_some());
    }

    #[tokio::test]
    async fn release_failure_keeps_handle_retryable() {
        let mut job = Sleeper::new(0);
        job.fail_release = true;
        let h = handle(job);
        h.run().await;
        let err = h.destroy(false).unwrap_err();
        assert!(matches!(err, DriverError::Release(_)));
        assert_eq!(h.state(), TaskState::Exited);
        assert!(h.is_cancelled());
    }

    #[test]
    fn start_time_is_rounded() {
        let h = handle(Sleeper::new(0));
        assert_eq!(round_to_millis(h.started_at()), h.started_at());
    }
}
