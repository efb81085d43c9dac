//! Concurrency tests for the task cell and the pending set.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use tickrun::cell::{SyncTask, Task};
use tickrun::pending::PendingSet;

fn counting_cell(calls: &Arc<AtomicUsize>) -> Arc<SyncTask<u32>> {
    let calls = calls.clone();
    Arc::new(SyncTask::new(move || {
        calls.fetch_add(1, Ordering::SeqCst);
        42
    }))
}

#[test]
fn computation_runs_once_under_contention() {
    const THREADS: usize = 8;
    let calls = Arc::new(AtomicUsize::new(0));
    let cell = counting_cell(&calls);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cell = cell.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                cell.run();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cell.wait(), Some(42));
}

#[test]
fn wait_is_idempotent_before_and_after_completion() {
    let cell = Arc::new(SyncTask::new(|| 7u32));

    let mut waiters = Vec::new();
    for _ in 0..3 {
        let cell = cell.clone();
        waiters.push(thread::spawn(move || cell.wait()));
    }

    thread::sleep(Duration::from_millis(50));
    cell.run();

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), Some(7));
    }
    // Waiting again after completion returns the same value.
    assert_eq!(cell.wait(), Some(7));
    assert_eq!(cell.wait(), Some(7));
}

#[test]
fn timeout_with_cancel_closes_the_cell() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cell = counting_cell(&calls);

    let start = Instant::now();
    let result = cell.wait_timeout(Duration::from_millis(100), true);
    let elapsed = start.elapsed();

    assert_eq!(result, None);
    assert!(elapsed >= Duration::from_millis(90), "returned too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "returned too late: {elapsed:?}");
    assert!(cell.is_done());

    // The cell is permanently closed; a later run is a no-op.
    cell.run();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(cell.wait(), None);
}

#[test]
fn timeout_without_cancel_leaves_the_cell_runnable() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cell = counting_cell(&calls);

    let result = cell.wait_timeout(Duration::from_millis(100), false);
    assert_eq!(result, None);
    assert!(!cell.is_done());

    cell.run();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cell.wait(), Some(42));
}

#[test]
fn cancel_evicts_the_cell_from_its_pending_set() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cell = counting_cell(&calls);
    let set = PendingSet::new();
    let key = set.add(cell.clone());
    assert!(set.contains(key));

    cell.cancel();
    assert!(!set.contains(key));
    assert!(cell.is_done());

    cell.run();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(cell.wait(), None);
}

#[test]
fn double_cancel_and_cancel_after_completion_are_noops() {
    let cell = Arc::new(SyncTask::new(|| 5u32));
    cell.run();
    cell.cancel();
    cell.cancel();
    assert!(cell.is_done());
    assert_eq!(cell.wait(), Some(5));

    let fresh: SyncTask<u32> = SyncTask::new(|| 5);
    fresh.cancel();
    fresh.cancel();
    assert!(fresh.is_done());
    assert_eq!(fresh.wait(), None);
}

#[test]
fn panicking_computation_releases_waiters_with_an_empty_result() {
    let cell: Arc<SyncTask<u32>> = Arc::new(SyncTask::new(|| panic!("computation failed")));

    let waiter = {
        let cell = cell.clone();
        thread::spawn(move || cell.wait())
    };
    thread::sleep(Duration::from_millis(50));

    assert!(!cell.run());
    assert!(cell.is_done());
    assert_eq!(waiter.join().unwrap(), None);
    // The cell is closed for good; nothing can re-run it.
    assert!(!cell.run());
}

#[test]
fn dispatch_and_cancel_race_resolves_to_exactly_one_outcome() {
    for _ in 0..1000 {
        let calls = Arc::new(AtomicUsize::new(0));
        let cell = counting_cell(&calls);
        let set = PendingSet::new();
        let key = set.add(cell.clone());
        let barrier = Arc::new(Barrier::new(2));

        let dispatcher = {
            let set = set.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                // The executor's dequeue-then-run path.
                if let Some(task) = set.take(key) {
                    task.run();
                }
            })
        };
        let canceller = {
            let cell = cell.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                cell.cancel();
            })
        };
        dispatcher.join().unwrap();
        canceller.join().unwrap();

        // Either it ran and produced 42, or it was cancelled and produced
        // nothing; never both, and never still a member of the set.
        assert!(!set.contains(key));
        assert!(cell.is_done());
        let result = cell.wait();
        let ran = calls.load(Ordering::SeqCst);
        assert!(ran <= 1);
        match result {
            Some(value) => {
                assert_eq!(value, 42);
                assert_eq!(ran, 1);
            }
            None => assert_eq!(ran, 0),
        }
    }
}
