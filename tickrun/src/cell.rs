//! The single-assignment blocking task cell.
//!
//! A [`SyncTask`] holds a deferred computation, runs it at most once, and
//! publishes the result to any number of blocking waiters. It is the
//! handoff point between an executor thread (which calls [`SyncTask::run`])
//! and caller threads (which block in [`SyncTask::wait`] or
//! [`SyncTask::wait_timeout`]). A cell can also be registered in a
//! [`PendingSet`](crate::pending::PendingSet), in which case cancelling it
//! removes it from the set so the executor never dispatches it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::debug;

use crate::common::TaskKey;
use crate::pending::PendingSet;

/// The object-safe face of a schedulable, cancellable unit of work.
///
/// [`PendingSet`] stores tasks behind this trait so cells of different
/// result types can share one registry. [`SyncTask`] is the only
/// implementation in this crate, but executors only ever need this surface.
pub trait Task: Send + Sync {
    /// Executes the task's computation if it has not already completed.
    /// Returns whether this call produced a result.
    fn run(&self) -> bool;

    /// Marks the task completed without running it and removes it from its
    /// pending set, if any.
    fn cancel(&self);

    /// Best-effort completion check; never stale in the true-to-false
    /// direction.
    fn is_done(&self) -> bool;

    /// Replaces the task's back-reference to its pending set.
    fn bind_pending(&self, handle: Option<PendingHandle>);
}

/// A weak back-reference from a task cell to the [`PendingSet`] it sits in.
///
/// The handle never keeps the set alive. If the set has already been
/// dropped, discarding the handle is a no-op.
pub struct PendingHandle {
    set: Weak<PendingSet>,
    key: TaskKey,
}

impl PendingHandle {
    pub(crate) fn new(set: Weak<PendingSet>, key: TaskKey) -> Self {
        Self { set, key }
    }

    /// The key this task occupies in its pending set.
    pub fn key(&self) -> TaskKey {
        self.key
    }

    fn discard(self) {
        if let Some(set) = self.set.upgrade() {
            set.discard(self.key);
        }
    }
}

type Computation<T> = Box<dyn FnOnce() -> T + Send>;

struct State<T> {
    computation: Option<Computation<T>>,
    result: Option<T>,
    pending: Option<PendingHandle>,
}

/// A deferred computation with a single-assignment result slot and
/// blocking retrieval.
///
/// The cell moves through exactly one false-to-true `completed` transition,
/// caused by whichever of [`run`](Self::run), [`cancel`](Self::cancel), or a
/// timed-out [`wait_timeout`](Self::wait_timeout) with `cancel_on_timeout`
/// gets there first. The computation itself executes at most once, under the
/// cell's lock, on the first `run` caller to win the race.
///
/// Waiters never observe an error from this type. A computation that can
/// fail should produce `T = Result<..>` and let the caller inspect the
/// wrapped value; a cell that completed without running its computation
/// (cancelled or timed out) simply yields `None`.
pub struct SyncTask<T> {
    state: Mutex<State<T>>,
    waiters: Condvar,
    completed: AtomicBool,
}

impl<T: Send + 'static> SyncTask<T> {
    /// Wraps a computation in a new, not-yet-run cell.
    pub fn new(computation: impl FnOnce() -> T + Send + 'static) -> Self {
        Self {
            state: Mutex::new(State {
                computation: Some(Box::new(computation)),
                result: None,
                pending: None,
            }),
            waiters: Condvar::new(),
            completed: AtomicBool::new(false),
        }
    }

    /// Runs the computation if the cell has not already completed.
    ///
    /// Safe to call from any number of threads; the first caller to take the
    /// lock executes the computation, every later caller observes
    /// `completed` and returns immediately. The pending back-reference is
    /// cleared before the computation is invoked: a cell stops being
    /// "pending" the moment execution starts.
    ///
    /// Returns `true` only when this call ran the computation to a result.
    /// A panicking computation is caught, not propagated: the cell still
    /// completes (empty) so waiters are released, honoring the rule that
    /// nothing escapes the run or wait paths.
    pub fn run(&self) -> bool {
        if self.completed.load(Ordering::Acquire) {
            return false;
        }
        let mut state = self.lock_state();
        if self.completed.load(Ordering::Acquire) {
            return false;
        }
        state.pending = None;
        let mut produced = false;
        if let Some(computation) = state.computation.take() {
            match panic::catch_unwind(AssertUnwindSafe(computation)) {
                Ok(value) => {
                    state.result = Some(value);
                    produced = true;
                }
                Err(_) => debug!("sync task computation panicked; completing with no result"),
            }
        }
        self.completed.store(true, Ordering::Release);
        self.waiters.notify_all();
        produced
    }

    /// Marks the cell completed without running the computation.
    ///
    /// Waiters are woken and receive `None`. If the cell is registered in a
    /// pending set it removes itself, tolerating already-absent entries.
    /// Cancelling twice, or after natural completion, is a no-op.
    pub fn cancel(&self) {
        if self.completed.load(Ordering::Acquire) {
            return;
        }
        let mut state = self.lock_state();
        if self.completed.load(Ordering::Acquire) {
            return;
        }
        self.completed.store(true, Ordering::Release);
        self.waiters.notify_all();
        // Lock order is always cell lock, then set lock. The set's own
        // paths never touch a cell while holding the set lock.
        if let Some(handle) = state.pending.take() {
            handle.discard();
        }
    }

    /// Best-effort completion check.
    pub fn is_done(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Replaces the back-reference to the pending set this cell sits in.
    ///
    /// Called by [`PendingSet::add`](crate::pending::PendingSet::add) when
    /// the cell is enqueued.
    pub fn bind_pending(&self, handle: Option<PendingHandle>) {
        self.lock_state().pending = handle;
    }

    fn lock_state(&self) -> MutexGuard<'_, State<T>> {
        // The state is coherent even through a poisoning panic (single
        // assignments only), so lock users recover rather than propagate.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Send + 'static> SyncTask<T> {
    /// Blocks until the cell completes, then returns a clone of the result.
    ///
    /// The loop condition, not any single wake-up, is authoritative:
    /// spurious wakes re-check `completed` and go back to sleep. Calling
    /// this before or after completion returns the same value, and a cell
    /// that completed without running its computation yields `None`.
    pub fn wait(&self) -> Option<T> {
        let mut state = self.lock_state();
        while !self.completed.load(Ordering::Acquire) {
            state = self
                .waiters
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.result.clone()
    }

    /// Blocks for at most `timeout`, then returns whatever the result slot
    /// holds.
    ///
    /// This is a single bounded wait, not a retry loop: one window, then
    /// give up, regardless of why the wait returned. If the window closes
    /// with the cell still incomplete and `cancel_on_timeout` is set, the
    /// cell is forced to completed without running the computation, so no
    /// later [`run`](Self::run) will execute it. With `cancel_on_timeout`
    /// unset the cell stays eligible for a later run.
    pub fn wait_timeout(&self, timeout: Duration, cancel_on_timeout: bool) -> Option<T> {
        let mut state = self.lock_state();
        if !self.completed.load(Ordering::Acquire) {
            let (guard, _) = self
                .waiters
                .wait_timeout(state, timeout)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
            if !self.completed.load(Ordering::Acquire) && cancel_on_timeout {
                self.completed.store(true, Ordering::Release);
                self.waiters.notify_all();
            }
        }
        state.result.clone()
    }
}

impl<T: Clone + Send + 'static> Task for SyncTask<T> {
    fn run(&self) -> bool {
        SyncTask::run(self)
    }

    fn cancel(&self) {
        SyncTask::cancel(self)
    }

    fn is_done(&self) -> bool {
        SyncTask::is_done(self)
    }

    fn bind_pending(&self, handle: Option<PendingHandle>) {
        SyncTask::bind_pending(self, handle)
    }
}
