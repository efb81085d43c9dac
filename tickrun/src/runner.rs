//! The scheduling layer that ties cells, the pending set, and interval
//! jobs to a tokio runtime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use slotmap::SlotMap;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info};

use crate::cell::SyncTask;
use crate::common::{IntervalId, TaskKey};
use crate::config::IntervalPlan;
use crate::events::RunnerEvent;
use crate::interval::{self, FnInterval, Interval};
use crate::pending::PendingSet;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The registry of live interval jobs. Finished jobs reap their own entry
/// through a weak handle, mirroring the cell-to-pending-set back-reference.
pub(crate) type IntervalRegistry = Mutex<SlotMap<IntervalId, JoinHandle<()>>>;

/// A handle for scheduling work on a tokio runtime.
///
/// The runner is cheap to clone and share; every clone refers to the same
/// pending set, interval registry, and event channel. Fire-and-forget
/// closures go to the async pool, synchronous submits go to the blocking
/// pool with the caller parked on the cell until the result lands.
#[derive(Clone)]
pub struct Runner {
    handle: Handle,
    pending: Arc<PendingSet>,
    intervals: Arc<IntervalRegistry>,
    event_sender: broadcast::Sender<RunnerEvent>,
}

impl Runner {
    /// Creates a runner that schedules onto the given runtime handle.
    pub fn new(handle: Handle) -> Self {
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            handle,
            pending: PendingSet::new(),
            intervals: Arc::new(Mutex::new(SlotMap::with_key())),
            event_sender,
        }
    }

    /// Creates a runner bound to the runtime the caller is already inside.
    pub fn try_current() -> anyhow::Result<Self> {
        Ok(Self::new(Handle::try_current()?))
    }

    /// Subscribes to the [`RunnerEvent`] stream.
    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.event_sender.subscribe()
    }

    /// The shared registry of submitted-but-not-yet-dispatched tasks.
    pub fn pending(&self) -> &Arc<PendingSet> {
        &self.pending
    }

    /// Runs a closure on the async pool.
    pub fn spawn(&self, action: impl FnOnce() + Send + 'static) -> JoinHandle<()> {
        self.handle.spawn(async move { action() })
    }

    /// Runs a closure on the async pool after a delay.
    pub fn spawn_delayed(
        &self,
        delay: Duration,
        action: impl FnOnce() + Send + 'static,
    ) -> JoinHandle<()> {
        self.handle.spawn(async move {
            time::sleep(delay).await;
            action();
        })
    }

    /// Runs a closure on the async pool at a point in time. An instant in
    /// the past fires immediately.
    pub fn spawn_at(&self, at: Instant, action: impl FnOnce() + Send + 'static) -> JoinHandle<()> {
        self.handle.spawn(async move {
            time::sleep_until(at).await;
            action();
        })
    }

    /// Wraps a computation in a [`SyncTask`], registers it in the pending
    /// set, and dispatches it to the blocking pool.
    ///
    /// The dispatch path dequeues the cell from the set before running it,
    /// so a [`Submitted::cancel`] or [`Runner::cancel_task`] that lands
    /// first means the computation never executes. The returned handle is
    /// how callers block on, time-bound, poll, or cancel the task.
    pub fn submit<T>(&self, computation: impl FnOnce() -> T + Send + 'static) -> Submitted<T>
    where
        T: Clone + Send + 'static,
    {
        let task = Arc::new(SyncTask::new(computation));
        let key = self.pending.add(task.clone());
        self.event_sender
            .send(RunnerEvent::TaskScheduled { key })
            .ok();
        debug!(?key, "sync task scheduled");

        let pending = self.pending.clone();
        let events = self.event_sender.clone();
        self.handle.spawn_blocking(move || {
            // A cell already closed by a timed-out wait dequeues but runs as
            // a no-op; only a run that produced a result counts as completed.
            if let Some(task) = pending.take(key) {
                if task.run() {
                    events.send(RunnerEvent::TaskCompleted { key }).ok();
                }
            }
        });

        Submitted { key, task }
    }

    /// Submits a computation and blocks the calling thread until it
    /// completes. Never call this from an async worker thread.
    pub fn sync<T>(&self, computation: impl FnOnce() -> T + Send + 'static) -> Option<T>
    where
        T: Clone + Send + 'static,
    {
        self.submit(computation).wait()
    }

    /// Submits a computation and blocks for at most `timeout`.
    ///
    /// `cancel_on_timeout` carries the cell's timeout-as-cancel policy: when
    /// set, an expired wait permanently closes the cell so the computation
    /// can no longer run.
    pub fn sync_timeout<T>(
        &self,
        computation: impl FnOnce() -> T + Send + 'static,
        timeout: Duration,
        cancel_on_timeout: bool,
    ) -> Option<T>
    where
        T: Clone + Send + 'static,
    {
        self.submit(computation)
            .wait_timeout(timeout, cancel_on_timeout)
    }

    /// Cancels a pending task by key.
    ///
    /// Returns `false` if the task was already dispatched, finished, or
    /// cancelled.
    pub fn cancel_task(&self, key: TaskKey) -> bool {
        match self.pending.take(key) {
            Some(task) => {
                task.cancel();
                self.event_sender
                    .send(RunnerEvent::TaskCancelled { key })
                    .ok();
                true
            }
            None => false,
        }
    }

    /// Registers an interval job driven by the given plan.
    ///
    /// The job ticks on the async pool until its plan is exhausted or
    /// [`cancel_interval`](Self::cancel_interval) tears it down; exactly one
    /// of the interval's `finish`/`cancel` hooks fires at the end.
    pub fn interval(&self, plan: IntervalPlan, interval: impl Interval + 'static) -> IntervalId {
        let events = self.event_sender.clone();
        let handle = self.handle.clone();
        let registry = Arc::downgrade(&self.intervals);
        self.lock_intervals().insert_with_key(|id| {
            handle.spawn(interval::drive(id, plan, interval, events, registry))
        })
    }

    /// Registers an interval job from a bare tick closure.
    pub fn interval_fn(
        &self,
        plan: IntervalPlan,
        tick: impl FnMut(u64) + Send + 'static,
    ) -> IntervalId {
        self.interval(plan, FnInterval(tick))
    }

    /// Tears down an interval job.
    ///
    /// The job's `cancel` hook runs from the aborted task's drop, shortly
    /// after this returns. Returns `false` if the id is unknown or the job
    /// already ran to completion and reaped itself.
    pub fn cancel_interval(&self, id: IntervalId) -> bool {
        match self.lock_intervals().remove(id) {
            Some(job) => {
                job.abort();
                true
            }
            None => false,
        }
    }

    /// Aborts every interval job and cancels every pending task.
    pub fn shutdown(&self) {
        info!("runner shutting down");
        let jobs: Vec<JoinHandle<()>> = self
            .lock_intervals()
            .drain()
            .map(|(_, job)| job)
            .collect();
        for job in jobs {
            job.abort();
        }
        self.pending.cancel_all();
    }

    fn lock_intervals(&self) -> MutexGuard<'_, SlotMap<IntervalId, JoinHandle<()>>> {
        self.intervals.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A typed handle to a task submitted through [`Runner::submit`].
pub struct Submitted<T> {
    key: TaskKey,
    task: Arc<SyncTask<T>>,
}

impl<T: Clone + Send + 'static> Submitted<T> {
    /// The task's key in the runner's pending set.
    pub fn key(&self) -> TaskKey {
        self.key
    }

    /// Blocks until the task completes; `None` means it was cancelled.
    pub fn wait(&self) -> Option<T> {
        self.task.wait()
    }

    /// One bounded wait; see [`SyncTask::wait_timeout`].
    pub fn wait_timeout(&self, timeout: Duration, cancel_on_timeout: bool) -> Option<T> {
        self.task.wait_timeout(timeout, cancel_on_timeout)
    }

    /// Cancels the task if it has not already completed.
    pub fn cancel(&self) {
        self.task.cancel()
    }

    /// Best-effort completion check.
    pub fn is_done(&self) -> bool {
        self.task.is_done()
    }
}
