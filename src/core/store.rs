//! Concurrency-safe registry of tracked jobs.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::util::TaskId;

/// Registry mapping job identity to a shared handle.
///
/// Backed by a sharded map so operations on unrelated IDs do not contend on a
/// single lock. Per-key operations are linearizable.
pub struct TaskStore<H> {
    tasks: DashMap<TaskId, Arc<H>>,
}

impl<H> TaskStore<H> {
    /// Create an empty store with the default shard count.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }

    /// Create an empty store with `shards` shards (power of two, greater than one).
    #[must_use]
    pub fn with_shards(shards: usize) -> Self {
        Self {
            tasks: DashMap::with_shard_amount(shards),
        }
    }

    /// Look up a handle. `None` means the job is not tracked.
    pub fn get(&self, id: &str) -> Option<Arc<H>> {
        self.tasks.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Insert or overwrite, returning the previous handle.
    pub fn set(&self, id: TaskId, handle: Arc<H>) -> Option<Arc<H>> {
        self.tasks.insert(id, handle)
    }

    /// Insert only if the ID is not tracked yet. Returns `false` when it already was.
    pub fn insert_new(&self, id: TaskId, handle: Arc<H>) -> bool {
        match self.tasks.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    /// Remove an entry, returning the removed handle.
    pub fn delete(&self, id: &str) -> Option<Arc<H>> {
        self.tasks.remove(id).map(|(_, handle)| handle)
    }

    /// Remove the entry only if it still holds `handle`.
    ///
    /// Returns `false` when the ID is untracked or now maps to another handle.
    pub fn delete_if(&self, id: &str, handle: &Arc<H>) -> bool {
        self.tasks
            .remove_if(id, |_, current| Arc::ptr_eq(current, handle))
            .is_some()
    }

    /// Whether the ID is tracked.
    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// Number of tracked jobs.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no job is tracked.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Snapshot of tracked IDs, in no particular order.
    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl<H> Default for TaskStore<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let store = TaskStore::new();
        assert!(store.get("a").is_none());
        assert!(store.set(TaskId::from("a"), Arc::new(1)).is_none());
        assert_eq!(store.get("a").as_deref(), Some(&1));
        assert_eq!(store.set(TaskId::from("a"), Arc::new(2)).as_deref(), Some(&1));
        assert_eq!(store.delete("a").as_deref(), Some(&2));
        assert!(store.get("a").is_none());
        assert!(store.delete("a").is_none());
    }

    #[test]
    fn insert_new_keeps_first() {
        let store = TaskStore::with_shards(4);
        assert!(store.insert_new(TaskId::from("a"), Arc::new(1)));
        assert!(!store.insert_new(TaskId::from("a"), Arc::new(2)));
        assert_eq!(store.get("a").as_deref(), Some(&1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_if_leaves_replacement_in_place() {
        let store = TaskStore::new();
        let old = Arc::new(1);
        store.set(TaskId::from("a"), Arc::clone(&old));
        assert!(store.delete_if("a", &old));
        assert!(!store.delete_if("a", &old));

        let new = Arc::new(1);
        assert!(store.insert_new(TaskId::from("a"), Arc::clone(&new)));
        assert!(!store.delete_if("a", &old));
        assert!(Arc::ptr_eq(&store.get("a").unwrap(), &new));
    }

    #[test]
    fn concurrent_distinct_keys() {
        let store = Arc::new(TaskStore::new());
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let id = TaskId::new(format!("{t}-{i}"));
                        assert!(store.insert_new(id.clone(), Arc::new(i)));
                        assert_eq!(store.get(id.as_str()).as_deref(), Some(&i));
                        if i % 2 == 0 {
                            store.delete(id.as_str());
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(store.len(), 8 * 50);
    }
}
