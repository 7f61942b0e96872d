//! In-memory cluster scheduler with failure injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{CreateSandbox, Sandbox, SchedulerClient, UpstreamError};
use crate::util::SandboxId;

/// Scheduler that keeps sandboxes in a map and names them `sbx-1`, `sbx-2`, ...
pub struct InMemoryScheduler {
    client_id: String,
    next_id: AtomicU64,
    create_calls: AtomicUsize,
    live: Mutex<HashMap<SandboxId, CreateSandbox>>,
    deletes: Mutex<Vec<(SandboxId, bool)>>,
    create_error: Mutex<Option<UpstreamError>>,
    delete_error: Mutex<Option<UpstreamError>>,
    create_delay: Mutex<Duration>,
}

impl InMemoryScheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client_id: "client-1".into(),
            next_id: AtomicU64::new(1),
            create_calls: AtomicUsize::new(0),
            live: Mutex::new(HashMap::new()),
            deletes: Mutex::new(Vec::new()),
            create_error: Mutex::new(None),
            delete_error: Mutex::new(None),
            create_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Delay every create call by `delay`.
    #[must_use]
    pub fn with_create_delay(self, delay: Duration) -> Self {
        *self.create_delay.lock() = delay;
        self
    }

    /// Make create calls fail with `err` (`None` to succeed again).
    pub fn fail_create(&self, err: Option<UpstreamError>) {
        *self.create_error.lock() = err;
    }

    /// Make delete calls fail with `err` (`None` to succeed again).
    pub fn fail_delete(&self, err: Option<UpstreamError>) {
        *self.delete_error.lock() = err;
    }

    /// Number of create calls received.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Delete calls received, in order, with their `forced` flag.
    pub fn delete_calls(&self) -> Vec<(SandboxId, bool)> {
        self.deletes.lock().clone()
    }

    /// Whether the sandbox exists on the scheduler.
    pub fn is_live(&self, id: &str) -> bool {
        self.live.lock().contains_key(id)
    }

    /// Number of sandboxes alive on the scheduler.
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}

impl Default for InMemoryScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchedulerClient for InMemoryScheduler {
    async fn create_sandbox(&self, request: &CreateSandbox) -> Result<Sandbox, UpstreamError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.create_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.create_error.lock().clone() {
            return Err(err);
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let sandbox_id = SandboxId::new(format!("sbx-{n}"));
        self.live.lock().insert(sandbox_id.clone(), request.clone());
        Ok(Sandbox {
            sandbox_id,
            template_id: request.template_id.clone(),
            alias: request.alias.clone(),
            client_id: self.client_id.clone(),
        })
    }

    async fn delete_instance(&self, id: &SandboxId, forced: bool) -> Result<(), UpstreamError> {
        self.deletes.lock().push((id.clone(), forced));
        if let Some(err) = self.delete_error.lock().clone() {
            return Err(err);
        }
        match self.live.lock().remove(id) {
            Some(_) => Ok(()),
            None => Err(UpstreamError::new(
                404,
                format!("sandbox \"{id}\" not found"),
                "delete of unknown sandbox",
            )),
        }
    }
}
