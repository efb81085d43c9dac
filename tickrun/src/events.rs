//! Defines the event types broadcast by a [`Runner`](crate::runner::Runner).
//!
//! Observers subscribe through
//! [`Runner::subscribe`](crate::runner::Runner::subscribe) and receive these
//! on a `tokio::sync::broadcast` channel. Sends are fire-and-forget; a
//! runner with no subscribers pays only the failed-send check.

use crate::common::{IntervalId, TaskKey};

/// Everything observable about a runner's scheduled work.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    /// A sync task was registered in the pending set and handed to the
    /// blocking pool.
    TaskScheduled { key: TaskKey },
    /// A sync task's computation ran to completion.
    TaskCompleted { key: TaskKey },
    /// A sync task was cancelled out of the pending set by key before it
    /// was dispatched.
    TaskCancelled { key: TaskKey },
    /// An interval job began its loop.
    IntervalStarted { id: IntervalId },
    /// An interval delivered one tick with the given sequence index.
    IntervalTick { id: IntervalId, index: u64 },
    /// A finite interval delivered its last tick and ran its finish hook.
    IntervalFinished { id: IntervalId },
    /// An interval was torn down before finishing and ran its cancel hook.
    IntervalCancelled { id: IntervalId },
}
