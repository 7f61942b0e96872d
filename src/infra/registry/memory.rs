//! In-memory artifact registry.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::jobs::ArtifactRegistry;
use crate::core::BoxError;

/// Registry holding template images by template ID.
#[derive(Default)]
pub struct InMemoryArtifactRegistry {
    images: Mutex<HashSet<String>>,
    deleted: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl InMemoryArtifactRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an image for `template_id`.
    pub fn push_image(&self, template_id: impl Into<String>) {
        self.images.lock().insert(template_id.into());
    }

    /// Whether an image exists for `template_id`.
    pub fn has_image(&self, template_id: &str) -> bool {
        self.images.lock().contains(template_id)
    }

    /// Template IDs whose images were deleted, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }

    /// Make deletes fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArtifactRegistry for InMemoryArtifactRegistry {
    async fn delete_image(&self, template_id: &str) -> Result<(), BoxError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(format!("registry unavailable deleting {template_id}").into());
        }
        self.images.lock().remove(template_id);
        self.deleted.lock().push(template_id.to_owned());
        Ok(())
    }
}
