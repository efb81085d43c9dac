//! The shared registry of not-yet-dispatched tasks.
//!
//! Executors enqueue cells here before dispatching them and dequeue them
//! (`take`) right before running, so a cancellation arriving in between
//! simply finds nothing to run. Cells remove themselves on
//! [`cancel`](crate::cell::Task::cancel) through the weak
//! [`PendingHandle`](crate::cell::PendingHandle) they are bound with.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use slotmap::SlotMap;
use tracing::trace;

use crate::cell::{PendingHandle, Task};
use crate::common::TaskKey;

/// A thread-safe collection of outstanding task cells.
///
/// All mutation happens under the set's single lock. Removal is idempotent:
/// a cell may already have been taken by an executor or discarded by an
/// earlier cancel, and that is not an error.
#[derive(Default)]
pub struct PendingSet {
    tasks: Mutex<SlotMap<TaskKey, Arc<dyn Task>>>,
}

impl PendingSet {
    /// Creates an empty set.
    ///
    /// The set is handed out as an `Arc` because registered cells hold weak
    /// references back into it.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a task and binds its back-reference to this set.
    pub fn add(self: &Arc<Self>, task: Arc<dyn Task>) -> TaskKey {
        let key = self.lock_tasks().insert(task.clone());
        task.bind_pending(Some(PendingHandle::new(Arc::downgrade(self), key)));
        key
    }

    /// Removes and returns a task, or `None` if it is already gone.
    ///
    /// Executors call this immediately before running: dequeue-then-run
    /// means a task cancelled out of the set is never dispatched.
    pub fn take(&self, key: TaskKey) -> Option<Arc<dyn Task>> {
        self.lock_tasks().remove(key)
    }

    /// Removes a task if it is still present.
    ///
    /// Absence is swallowed. This is the self-removal path used by
    /// [`SyncTask::cancel`](crate::cell::SyncTask::cancel); the caller holds
    /// the cell lock, so this method must never reach back into a cell.
    pub fn discard(&self, key: TaskKey) {
        if self.lock_tasks().remove(key).is_none() {
            trace!(?key, "discarding a pending task that was already gone");
        }
    }

    /// Whether the set currently holds the given task.
    pub fn contains(&self, key: TaskKey) -> bool {
        self.lock_tasks().contains_key(key)
    }

    /// Number of outstanding tasks.
    pub fn len(&self) -> usize {
        self.lock_tasks().len()
    }

    /// Whether there are no outstanding tasks.
    pub fn is_empty(&self) -> bool {
        self.lock_tasks().is_empty()
    }

    /// Cancels every outstanding task.
    ///
    /// The set lock is released before any cell is touched: `cancel`
    /// re-enters this set from under the cell's own lock, and lock order is
    /// always cell first, set second.
    pub fn cancel_all(&self) {
        let snapshot: Vec<Arc<dyn Task>> = self.lock_tasks().values().cloned().collect();
        for task in snapshot {
            task.cancel();
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, SlotMap<TaskKey, Arc<dyn Task>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::SyncTask;

    #[test]
    fn discard_is_idempotent() {
        let set = PendingSet::new();
        let task = Arc::new(SyncTask::new(|| 0u32));
        let key = set.add(task);
        set.discard(key);
        set.discard(key);
        assert!(set.is_empty());
    }

    #[test]
    fn take_dequeues_exactly_once() {
        let set = PendingSet::new();
        let task = Arc::new(SyncTask::new(|| 9u32));
        let key = set.add(task);
        assert!(set.take(key).is_some());
        assert!(set.take(key).is_none());
    }

    #[test]
    fn cancel_all_empties_the_set_and_closes_cells() {
        let set = PendingSet::new();
        let a = Arc::new(SyncTask::new(|| 1u32));
        let b = Arc::new(SyncTask::new(|| 2u32));
        set.add(a.clone());
        set.add(b.clone());
        set.cancel_all();
        assert!(set.is_empty());
        assert!(a.is_done());
        assert!(b.is_done());
        assert_eq!(a.wait(), None);
    }
}
