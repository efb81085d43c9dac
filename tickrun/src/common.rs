//! Contains common, primitive key types used across the crate.
//!
//! Handles into the runner's registries are slotmap keys rather than raw
//! indices or pointers. A key stays valid for exactly one insertion, so a
//! handle held after removal can never alias a newer entry.

use slotmap::new_key_type;

new_key_type! {
    /// Uniquely identifies a task registered in a [`PendingSet`](crate::pending::PendingSet).
    ///
    /// The key is returned when a task is enqueued and can be used to
    /// dequeue or cancel it from any thread. Keys are never reused.
    pub struct TaskKey;

    /// Uniquely identifies a running interval job inside a
    /// [`Runner`](crate::runner::Runner).
    pub struct IntervalId;
}
