//! The interval ("tick") callback surface and its driver loop.
//!
//! An interval job calls [`Interval::tick`] once per period with a
//! monotonically increasing index, then ends with exactly one of
//! [`Interval::finish`] (the configured tick count was delivered) or
//! [`Interval::cancel`] (torn down early). The exactly-one guarantee holds
//! even when the driving tokio task is aborted mid-sleep, because the
//! terminal hook runs from a drop guard rather than loop epilogue code.

use std::sync::{PoisonError, Weak};

use tokio::sync::broadcast;
use tokio::time;
use tracing::debug;

use crate::common::IntervalId;
use crate::config::IntervalPlan;
use crate::events::RunnerEvent;
use crate::runner::IntervalRegistry;

/// A tick-style interval callback.
///
/// `tick` is required; the terminal hooks default to empty so simple
/// callers only override what they need.
pub trait Interval: Send {
    /// One heartbeat. `index` starts at the plan's `start_index` and
    /// increments by one per invocation.
    fn tick(&mut self, index: u64);

    /// Called once after the final tick of a finite interval.
    fn finish(&mut self) {}

    /// Called once if the interval is torn down before finishing.
    fn cancel(&mut self) {}
}

/// Adapts a bare closure into an [`Interval`] with no terminal hooks.
pub(crate) struct FnInterval<F>(pub(crate) F);

impl<F: FnMut(u64) + Send> Interval for FnInterval<F> {
    fn tick(&mut self, index: u64) {
        (self.0)(index)
    }
}

/// Fires the terminal hook exactly once, on whatever path drops the loop.
struct IntervalGuard<I: Interval> {
    interval: I,
    finished: bool,
    id: IntervalId,
    events: broadcast::Sender<RunnerEvent>,
}

impl<I: Interval> Drop for IntervalGuard<I> {
    fn drop(&mut self) {
        if self.finished {
            debug!(id = ?self.id, "interval finished");
            self.interval.finish();
            self.events
                .send(RunnerEvent::IntervalFinished { id: self.id })
                .ok();
        } else {
            debug!(id = ?self.id, "interval cancelled");
            self.interval.cancel();
            self.events
                .send(RunnerEvent::IntervalCancelled { id: self.id })
                .ok();
        }
    }
}

/// The loop body of one interval job.
///
/// A finite interval counts as finished the moment its last tick is
/// delivered; cancellation during the trailing sleep still reports
/// `finish`, not `cancel`. A plan with `times == Some(0)` delivers no tick
/// and counts as cancelled.
///
/// On natural completion the job removes its own registry entry before the
/// terminal hook fires, so the registry only ever holds live jobs; the
/// abort paths remove the entry on the runner side instead.
pub(crate) async fn drive<I: Interval>(
    id: IntervalId,
    plan: IntervalPlan,
    interval: I,
    events: broadcast::Sender<RunnerEvent>,
    registry: Weak<IntervalRegistry>,
) {
    let mut guard = IntervalGuard {
        interval,
        finished: false,
        id,
        events: events.clone(),
    };
    events.send(RunnerEvent::IntervalStarted { id }).ok();
    if !plan.delay().is_zero() {
        time::sleep(plan.delay()).await;
    }
    let mut index = plan.start_index;
    let mut remaining = plan.times;
    loop {
        if remaining == Some(0) {
            break;
        }
        guard.interval.tick(index);
        events.send(RunnerEvent::IntervalTick { id, index }).ok();
        if let Some(left) = remaining.as_mut() {
            *left -= 1;
            if *left == 0 {
                guard.finished = true;
            }
        }
        index += 1;
        time::sleep(plan.period()).await;
    }
    if let Some(registry) = registry.upgrade() {
        registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}
