//! In-memory operation log.

use crate::operation::{Operation, OperationId};

/// Outcome of recording a failed delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    /// The operation stays queued; carries the new retry count.
    Retry(u32),
    /// The operation hit the retry ceiling and was given up.
    ///
    /// The returned operation is `resolved` and `abandoned`.
    Abandoned(Operation),
}

/// An ordered log of operations waiting for delivery.
///
/// # Invariants
///
/// - Operations stay in arrival order; nothing reorders them
/// - Only delivery bookkeeping of an operation changes after append
/// - Resolved operations are removed by [`OperationLog::compact`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationLog {
    entries: Vec<Operation>,
}

impl OperationLog {
    /// Creates a new empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log from previously persisted operations, keeping their order.
    pub fn from_operations(operations: Vec<Operation>) -> Self {
        Self {
            entries: operations,
        }
    }

    /// Appends an operation and returns its id.
    pub fn append(&mut self, operation: Operation) -> OperationId {
        let id = operation.id().clone();
        self.entries.push(operation);
        id
    }

    /// Returns unresolved operations in arrival order.
    pub fn pending(&self) -> impl Iterator<Item = &Operation> {
        self.entries.iter().filter(|op| !op.is_resolved())
    }

    /// Returns the number of unresolved operations.
    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    /// Looks up an operation by id.
    pub fn get(&self, id: &OperationId) -> Option<&Operation> {
        self.entries.iter().find(|op| op.id() == id)
    }

    /// Marks the given operations as resolved.
    ///
    /// Returns how many operations changed state.
    pub fn mark_resolved(&mut self, ids: &[OperationId]) -> usize {
        let mut changed = 0;
        for op in self.entries.iter_mut() {
            if !op.is_resolved() && ids.contains(op.id()) {
                op.resolve();
                changed += 1;
            }
        }
        changed
    }

    /// Records a failed delivery attempt for an operation.
    ///
    /// Once the retry count reaches `max_retries` the operation is resolved
    /// and tagged as abandoned. Returns `None` if no unresolved operation
    /// has this id.
    pub fn record_failure(&mut self, id: &OperationId, max_retries: u32) -> Option<FailureOutcome> {
        let op = self
            .entries
            .iter_mut()
            .find(|op| op.id() == id && !op.is_resolved())?;

        let count = op.record_failure();
        if count >= max_retries {
            op.abandon();
            Some(FailureOutcome::Abandoned(op.clone()))
        } else {
            Some(FailureOutcome::Retry(count))
        }
    }

    /// Removes resolved operations. Returns how many were removed.
    pub fn compact(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|op| !op.is_resolved());
        before - self.entries.len()
    }

    /// Returns all operations, resolved ones included.
    pub fn operations(&self) -> &[Operation] {
        &self.entries
    }

    /// Returns the total number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clears all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Mutation;

    fn make_op(item: &str, timestamp: i64) -> Operation {
        Operation::new(
            &Mutation::AddLikedItem {
                item_id: item.to_string(),
            },
            "user_1",
            timestamp,
        )
        .unwrap()
    }

    #[test]
    fn append_keeps_arrival_order() {
        let mut log = OperationLog::new();
        let a = log.append(make_op("a", 1));
        let b = log.append(make_op("b", 2));
        let c = log.append(make_op("c", 3));

        let ids: Vec<_> = log.pending().map(|op| op.id().clone()).collect();
        assert_eq!(ids, vec![a, b, c]);
    }

    #[test]
    fn mark_resolved_is_partial() {
        let mut log = OperationLog::new();
        let a = log.append(make_op("a", 1));
        log.append(make_op("b", 2));
        let c = log.append(make_op("c", 3));

        assert_eq!(log.mark_resolved(&[a.clone(), c]), 2);
        assert_eq!(log.pending_count(), 1);

        // Already resolved entries are not counted twice.
        assert_eq!(log.mark_resolved(&[a]), 0);
    }

    #[test]
    fn record_failure_abandons_at_ceiling() {
        let mut log = OperationLog::new();
        let id = log.append(make_op("a", 1));

        for expected in 1..5 {
            assert_eq!(
                log.record_failure(&id, 5),
                Some(FailureOutcome::Retry(expected))
            );
        }

        match log.record_failure(&id, 5) {
            Some(FailureOutcome::Abandoned(op)) => {
                assert!(op.is_resolved());
                assert!(op.is_abandoned());
                assert_eq!(op.retry_count(), 5);
            }
            other => panic!("expected abandonment, got {other:?}"),
        }
        assert_eq!(log.pending_count(), 0);

        // Resolved operations no longer accept failures.
        assert_eq!(log.record_failure(&id, 5), None);
    }

    #[test]
    fn compact_removes_resolved() {
        let mut log = OperationLog::new();
        let a = log.append(make_op("a", 1));
        log.append(make_op("b", 2));

        log.mark_resolved(&[a.clone()]);
        assert_eq!(log.len(), 2);

        assert_eq!(log.compact(), 1);
        assert_eq!(log.len(), 1);
        assert!(log.get(&a).is_none());
    }

    #[test]
    fn from_operations_preserves_state() {
        let mut source = OperationLog::new();
        let a = source.append(make_op("a", 1));
        source.record_failure(&a, 5);

        let restored = OperationLog::from_operations(source.operations().to_vec());
        assert_eq!(restored.get(&a).unwrap().retry_count(), 1);
        assert_eq!(restored, source);
    }
}
