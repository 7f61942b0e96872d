//! In-memory object storage.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::jobs::{ObjectStorage, StorageFactory};
use crate::core::BoxError;

type Bucket = Arc<Mutex<BTreeSet<String>>>;

/// Storage client over one in-memory bucket.
pub struct InMemoryObjectStorage {
    bucket: String,
    objects: Bucket,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    fail_close: AtomicBool,
}

impl InMemoryObjectStorage {
    fn new(bucket: &str, objects: Bucket, fail_close: bool) -> Self {
        Self {
            bucket: bucket.to_owned(),
            objects,
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            fail_close: AtomicBool::new(fail_close),
        }
    }

    /// Bucket the client was opened for.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Whether `close` succeeded.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of `close` calls.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Make `close` fail.
    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, BoxError> {
        if self.is_closed() {
            return Err("storage client is closed".into());
        }
        let mut objects = self.objects.lock();
        let before = objects.len();
        objects.retain(|key| !key.starts_with(prefix));
        Ok(before - objects.len())
    }

    fn close(&self) -> Result<(), BoxError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(format!("failed to close client for bucket {}", self.bucket).into());
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out clients over shared in-memory buckets.
#[derive(Default)]
pub struct InMemoryStorageFactory {
    buckets: Mutex<HashMap<String, Bucket>>,
    clients: Mutex<Vec<Arc<InMemoryObjectStorage>>>,
    fail_open: AtomicBool,
    fail_close: AtomicBool,
}

impl InMemoryStorageFactory {
    /// Create a factory with no buckets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, name: &str) -> Bucket {
        Arc::clone(self.buckets.lock().entry(name.to_owned()).or_default())
    }

    /// Store an object.
    pub fn put(&self, bucket: &str, key: impl Into<String>) {
        self.bucket(bucket).lock().insert(key.into());
    }

    /// Keys currently stored in `bucket`.
    pub fn objects(&self, bucket: &str) -> Vec<String> {
        self.bucket(bucket).lock().iter().cloned().collect()
    }

    /// Every client opened so far.
    pub fn clients(&self) -> Vec<Arc<InMemoryObjectStorage>> {
        self.clients.lock().clone()
    }

    /// Make `open` fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make clients opened from now on fail to close.
    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageFactory for InMemoryStorageFactory {
    async fn open(&self, bucket: &str) -> Result<Arc<dyn ObjectStorage>, BoxError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(format!("failed to open bucket {bucket}").into());
        }
        let client = Arc::new(InMemoryObjectStorage::new(
            bucket,
            self.bucket(bucket),
            self.fail_close.load(Ordering::SeqCst),
        ));
        self.clients.lock().push(Arc::clone(&client));
        Ok(client)
    }
}
