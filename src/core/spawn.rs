//! Runtime seam for launching background work.

use std::future::Future;

/// Abstraction for spawning background work on a runtime.
pub trait Spawn: Send + Sync {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
