//! Durable operation queue.

use crate::error::SyncResult;
use closetsync_protocol::{FailureOutcome, Mutation, Operation, OperationId, OperationLog, Timestamp};
use closetsync_storage::KeyValueStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// An [`OperationLog`] persisted under a single storage key.
///
/// Every mutating call rewrites the full JSON array. Resolved operations
/// are compacted away before writing, so the persisted array only holds
/// operations still waiting for delivery.
pub struct DurableQueue<S> {
    store: Arc<S>,
    key: String,
    log: OperationLog,
    max_retries: u32,
}

impl<S: KeyValueStore> DurableQueue<S> {
    /// Restores the queue stored under `key`.
    ///
    /// Missing, unreadable or corrupt content yields an empty queue.
    pub fn load(store: Arc<S>, key: impl Into<String>, max_retries: u32) -> Self {
        let key = key.into();
        let log = match store.get(&key) {
            Ok(Some(text)) => match serde_json::from_str::<Vec<Operation>>(&text) {
                Ok(operations) => {
                    debug!(key = %key, count = operations.len(), "restored operation queue");
                    OperationLog::from_operations(operations)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "discarding corrupt operation queue");
                    OperationLog::new()
                }
            },
            Ok(None) => OperationLog::new(),
            Err(e) => {
                warn!(key = %key, error = %e, "failed to read operation queue");
                OperationLog::new()
            }
        };

        Self {
            store,
            key,
            log,
            max_retries,
        }
    }

    /// Appends a mutation for `user_id` and persists the queue.
    ///
    /// If persisting fails the operation is not kept.
    pub fn enqueue(
        &mut self,
        mutation: &Mutation,
        user_id: &str,
        timestamp: Timestamp,
    ) -> SyncResult<OperationId> {
        let operation = Operation::new(mutation, user_id, timestamp)?;
        let mut next = self.log.clone();
        let id = next.append(operation);
        self.commit(next)?;
        Ok(id)
    }

    /// Returns a copy of the pending operations in arrival order.
    pub fn pending(&self) -> Vec<Operation> {
        self.log.pending().cloned().collect()
    }

    /// Returns the number of pending operations.
    pub fn pending_count(&self) -> usize {
        self.log.pending_count()
    }

    /// Marks operations as delivered and persists the queue.
    pub fn mark_resolved(&mut self, ids: &[OperationId]) -> SyncResult<usize> {
        let mut next = self.log.clone();
        let changed = next.mark_resolved(ids);
        self.commit(next)?;
        Ok(changed)
    }

    /// Records a failed delivery attempt and persists the queue.
    pub fn record_failure(&mut self, id: &OperationId) -> SyncResult<Option<FailureOutcome>> {
        let mut next = self.log.clone();
        let outcome = next.record_failure(id, self.max_retries);
        self.commit(next)?;
        Ok(outcome)
    }

    /// Applies the results of a drain pass with a single write.
    ///
    /// Returns the operations abandoned by this pass. If the write fails
    /// the queue is left exactly as it was.
    pub fn settle(
        &mut self,
        delivered: &[OperationId],
        failed: &[OperationId],
    ) -> SyncResult<Vec<Operation>> {
        let mut next = self.log.clone();
        next.mark_resolved(delivered);

        let mut abandoned = Vec::new();
        for id in failed {
            if let Some(FailureOutcome::Abandoned(operation)) =
                next.record_failure(id, self.max_retries)
            {
                abandoned.push(operation);
            }
        }

        self.commit(next)?;
        Ok(abandoned)
    }

    /// Compacts and writes `next`, then makes it the live log.
    ///
    /// The live log only changes once the write succeeded.
    fn commit(&mut self, mut next: OperationLog) -> SyncResult<()> {
        next.compact();
        let text = serde_json::to_string(next.operations())?;
        self.store.set(&self.key, &text)?;
        self.log = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QUEUE_KEY;
    use closetsync_storage::{FileStore, InMemoryStore, StorageError, StorageResult};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store whose writes can be switched off.
    #[derive(Default)]
    struct ReadOnlySwitch {
        inner: InMemoryStore,
        read_only: AtomicBool,
    }

    impl ReadOnlySwitch {
        fn set_read_only(&self, read_only: bool) {
            self.read_only.store(read_only, Ordering::SeqCst);
        }
    }

    impl KeyValueStore for ReadOnlySwitch {
        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            if self.read_only.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::other("read-only")));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> StorageResult<()> {
            self.inner.remove(key)
        }

        fn keys(&self) -> StorageResult<Vec<String>> {
            self.inner.keys()
        }
    }

    fn like(item: &str) -> Mutation {
        Mutation::AddLikedItem {
            item_id: item.to_string(),
        }
    }

    fn queue(store: &Arc<InMemoryStore>) -> DurableQueue<InMemoryStore> {
        DurableQueue::load(Arc::clone(store), QUEUE_KEY, 5)
    }

    #[test]
    fn enqueue_persists_every_change() {
        let store = Arc::new(InMemoryStore::new());
        let mut q = queue(&store);

        let a = q.enqueue(&like("a"), "u", 1).unwrap();
        let b = q.enqueue(&like("b"), "u", 2).unwrap();

        let restored = queue(&store);
        let ids: Vec<_> = restored.pending().iter().map(|op| op.id().clone()).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn resolved_operations_do_not_come_back() {
        let store = Arc::new(InMemoryStore::new());
        let mut q = queue(&store);
        let a = q.enqueue(&like("a"), "u", 1).unwrap();
        q.enqueue(&like("b"), "u", 2).unwrap();

        assert_eq!(q.mark_resolved(&[a.clone()]).unwrap(), 1);

        let restored = queue(&store);
        assert_eq!(restored.pending_count(), 1);
        assert!(restored.pending().iter().all(|op| op.id() != &a));
    }

    #[test]
    fn corrupt_content_yields_empty_queue() {
        let store = Arc::new(InMemoryStore::new());
        store.set(QUEUE_KEY, "{not json").unwrap();

        let mut q = queue(&store);
        assert_eq!(q.pending_count(), 0);

        // The queue stays usable and overwrites the corrupt value.
        q.enqueue(&like("a"), "u", 1).unwrap();
        assert_eq!(queue(&store).pending_count(), 1);
    }

    #[test]
    fn retry_ceiling_abandons() {
        let store = Arc::new(InMemoryStore::new());
        let mut q = DurableQueue::load(Arc::clone(&store), QUEUE_KEY, 2);
        let a = q.enqueue(&like("a"), "u", 1).unwrap();

        assert_eq!(q.record_failure(&a).unwrap(), Some(FailureOutcome::Retry(1)));
        assert_eq!(queue(&store).pending()[0].retry_count(), 1);

        match q.record_failure(&a).unwrap() {
            Some(FailureOutcome::Abandoned(op)) => assert!(op.is_abandoned()),
            other => panic!("expected abandonment, got {other:?}"),
        }
        assert_eq!(q.pending_count(), 0);
        assert_eq!(queue(&store).pending_count(), 0);
    }

    #[test]
    fn settle_applies_a_whole_pass() {
        let store = Arc::new(InMemoryStore::new());
        let mut q = DurableQueue::load(Arc::clone(&store), QUEUE_KEY, 1);
        let a = q.enqueue(&like("a"), "u", 1).unwrap();
        let b = q.enqueue(&like("b"), "u", 2).unwrap();
        let c = q.enqueue(&like("c"), "u", 3).unwrap();

        let abandoned = q.settle(&[a], &[b.clone()]).unwrap();
        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].id(), &b);

        let restored = queue(&store);
        let ids: Vec<_> = restored.pending().iter().map(|op| op.id().clone()).collect();
        assert_eq!(ids, vec![c]);
    }

    #[test]
    fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = Arc::new(FileStore::open(dir.path()).unwrap());
            let mut q = DurableQueue::load(store, QUEUE_KEY, 5);
            q.enqueue(&like("a"), "u", 1).unwrap()
        };

        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let q = DurableQueue::load(store, QUEUE_KEY, 5);
        assert_eq!(q.pending()[0].id(), &id);
    }

    #[test]
    fn failed_write_leaves_queue_untouched() {
        let store = Arc::new(ReadOnlySwitch::default());
        let mut q = DurableQueue::load(Arc::clone(&store), QUEUE_KEY, 1);
        let a = q.enqueue(&like("a"), "u", 1).unwrap();
        let b = q.enqueue(&like("b"), "u", 2).unwrap();
        let persisted = store.get(QUEUE_KEY).unwrap();

        store.set_read_only(true);
        assert!(q.settle(&[a.clone()], &[b.clone()]).is_err());
        assert!(q.mark_resolved(&[a.clone()]).is_err());
        assert!(q.record_failure(&b).is_err());
        assert!(q.enqueue(&like("c"), "u", 3).is_err());

        let ids: Vec<_> = q.pending().iter().map(|op| op.id().clone()).collect();
        assert_eq!(ids, vec![a.clone(), b.clone()]);
        assert!(q.pending().iter().all(|op| op.retry_count() == 0));
        assert_eq!(store.get(QUEUE_KEY).unwrap(), persisted);

        // The next pass starts from the same state and reports the abandonment.
        store.set_read_only(false);
        let abandoned = q.settle(&[a], &[b.clone()]).unwrap();
        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].id(), &b);
        assert_eq!(q.pending_count(), 0);
    }
}
