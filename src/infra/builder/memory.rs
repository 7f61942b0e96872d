//! In-memory template builder that simulates build time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::core::jobs::{BuildSpec, TemplateBuilder};
use crate::core::BoxError;

/// Builder that takes a fixed time per build and records finished build IDs.
pub struct InMemoryTemplateBuilder {
    duration: Duration,
    started: AtomicUsize,
    built: Mutex<Vec<String>>,
    failure: Mutex<Option<String>>,
}

impl InMemoryTemplateBuilder {
    /// Builder whose builds take `duration`.
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started: AtomicUsize::new(0),
            built: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    /// Make builds fail with `message` (`None` to succeed again).
    pub fn fail_with(&self, message: Option<String>) {
        *self.failure.lock() = message;
    }

    /// Number of builds started.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Build IDs that completed.
    pub fn built(&self) -> Vec<String> {
        self.built.lock().clone()
    }
}

#[async_trait]
impl TemplateBuilder for InMemoryTemplateBuilder {
    async fn build(&self, spec: &BuildSpec, cancel: CancellationToken) -> Result<(), BoxError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failure.lock().clone() {
            return Err(message.into());
        }
        tokio::select! {
            () = cancel.cancelled() => Ok(()),
            () = tokio::time::sleep(self.duration) => {
                self.built.lock().push(spec.build_id.clone());
                Ok(())
            }
        }
    }
}
