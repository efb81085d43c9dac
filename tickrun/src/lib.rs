//! # Tickrun
//!
//! Tick-style interval callbacks and blocking sync tasks on top of tokio.
//!
//! Tickrun is a small scheduling helper for programs that mix async and
//! thread-blocking code. It offers two things:
//!
//! - **Sync tasks**: wrap a plain closure in a [`SyncTask`] cell, dispatch
//!   it to the runtime's blocking pool, and block any thread on the result
//!   with unbounded or single-bounded-timeout waits. Outstanding tasks live
//!   in a shared [`PendingSet`] and can be cancelled from anywhere before
//!   they are dispatched.
//! - **Interval jobs**: a [`tick`](interval::Interval::tick) callback fired
//!   at a fixed period, N times or forever, with a monotonically increasing
//!   sequence index and exactly one of `finish`/`cancel` delivered when the
//!   job ends.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use tickrun::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Create a runner bound to the current runtime.
//!     let runner = Runner::try_current()?;
//!
//!     // 2. Watch the event stream.
//!     let mut events = runner.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Received: {:?}", event);
//!         }
//!     });
//!
//!     // 3. Tick five times, 200ms apart.
//!     runner.interval_fn(
//!         IntervalPlan::every(Duration::from_millis(200)).times(5),
//!         |index| println!("tick #{index}"),
//!     );
//!
//!     // 4. Block a worker thread on a sync computation.
//!     let runner_clone = runner.clone();
//!     let answer = tokio::task::spawn_blocking(move || {
//!         runner_clone.sync(|| 42)
//!     })
//!     .await?;
//!     assert_eq!(answer, Some(42));
//!
//!     tokio::time::sleep(Duration::from_secs(2)).await;
//!     runner.shutdown();
//!     Ok(())
//! }
//! ```

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod cell;
pub mod common;
pub mod config;
pub mod events;
pub mod interval;
pub mod pending;
pub mod runner;

pub use cell::SyncTask;
pub use pending::PendingSet;
pub use runner::Runner;

/// A prelude module for easy importing of the most common Tickrun types.
pub mod prelude {
    pub use crate::cell::{SyncTask, Task};
    pub use crate::common::{IntervalId, TaskKey};
    pub use crate::config::{IntervalPlan, RunnerConfig};
    pub use crate::events::RunnerEvent;
    pub use crate::interval::Interval;
    pub use crate::pending::PendingSet;
    pub use crate::runner::{Runner, Submitted};
}
