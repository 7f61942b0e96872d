//! In-memory usage tracker.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::core::{BoxError, UsageTracker};

/// Records last-used updates and lets tests await them.
#[derive(Default)]
pub struct InMemoryUsageTracker {
    updates: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    fail: AtomicBool,
    notify: Notify,
}

impl InMemoryUsageTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make updates fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Template IDs updated so far.
    pub fn updates(&self) -> Vec<String> {
        self.updates.lock().clone()
    }

    /// Number of update calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` update calls were made.
    pub async fn wait_for_attempts(&self, n: usize) {
        loop {
            let notified = self.notify.notified();
            if self.attempts() >= n {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl UsageTracker for InMemoryUsageTracker {
    async fn update_env_last_used(&self, template_id: &str) -> Result<(), BoxError> {
        let result = if self.fail.load(Ordering::SeqCst) {
            Err(format!("failed to update last used for {template_id}").into())
        } else {
            self.updates.lock().push(template_id.to_owned());
            Ok(())
        };
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
        result
    }
}
