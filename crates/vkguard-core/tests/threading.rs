//! Integration test: threading checker
//!
//! Two threads claiming the same externally synchronized object must be
//! reported; nested claims on one thread must not.
//!
//! Run with: cargo test -p vkguard-core --test threading

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Barrier};

use vkguard_core::{Reporter, ThreadTracker};
use vkguard_protocol::{
    ObjectHandle, ObjectType, ReportFlags, ThreadingCheckerError, ValidationCode,
};

#[derive(Default)]
struct CountingReporter {
    conflicts: AtomicUsize,
}

impl Reporter for CountingReporter {
    fn report(&self, flags: ReportFlags, _object: ObjectHandle, code: ValidationCode, _message: &str) -> bool {
        assert!(flags.contains(ReportFlags::ERROR));
        assert_eq!(code, ValidationCode::from(ThreadingCheckerError::MultipleThreads));
        self.conflicts.fetch_add(1, Ordering::SeqCst);
        false
    }
}

fn make_object(raw: u64) -> ObjectHandle {
    ObjectHandle::new(raw, ObjectType::CommandBuffer)
}

#[test]
fn test_single_thread_nesting_is_clean() {
    let tracker = ThreadTracker::new();
    let reporter = CountingReporter::default();
    {
        let _outer = tracker.start_write(make_object(1), &reporter);
        let _inner = tracker.start_write(make_object(1), &reporter);
        assert_eq!(tracker.active(), 1);
    }
    assert_eq!(tracker.active(), 0);
    assert_eq!(reporter.conflicts.load(Ordering::SeqCst), 0);
}

#[test]
fn test_two_threads_same_object() {
    let tracker = ThreadTracker::new();
    let reporter = CountingReporter::default();
    let (claimed_tx, claimed_rx) = mpsc::channel();
    let release = Barrier::new(2);

    std::thread::scope(|s| {
        s.spawn(|| {
            let _guard = tracker.start_write(make_object(7), &reporter);
            claimed_tx.send(()).expect("signal claim");
            release.wait();
        });

        claimed_rx.recv().expect("wait for claim");
        {
            let _guard = tracker.start_write(make_object(7), &reporter);
        }
        release.wait();
    });

    assert_eq!(reporter.conflicts.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.active(), 0);
}

#[test]
fn test_two_threads_different_objects() {
    let tracker = ThreadTracker::new();
    let reporter = CountingReporter::default();
    let both_held = Barrier::new(2);

    std::thread::scope(|s| {
        for raw in [1u64, 2] {
            let (tracker, reporter, both_held) = (&tracker, &reporter, &both_held);
            s.spawn(move || {
                let _guard = tracker.start_write(make_object(raw), reporter);
                both_held.wait();
            });
        }
    });

    assert_eq!(reporter.conflicts.load(Ordering::SeqCst), 0);
    assert_eq!(tracker.active(), 0);
}

#[test]
fn test_sequential_use_from_two_threads() {
    let tracker = ThreadTracker::new();
    let reporter = CountingReporter::default();
    std::thread::scope(|s| {
        s.spawn(|| {
            let _guard = tracker.start_write(make_object(3), &reporter);
        })
        .join()
        .expect("first thread");
        s.spawn(|| {
            let _guard = tracker.start_write(make_object(3), &reporter);
        });
    });
    assert_eq!(reporter.conflicts.load(Ordering::SeqCst), 0);
}

#[test]
fn test_reclaim_while_other_thread_holds() {
    let tracker = ThreadTracker::new();
    let reporter = CountingReporter::default();
    let (go_tx, go_rx) = mpsc::channel();
    let (claimed_tx, claimed_rx) = mpsc::channel();
    let release = Barrier::new(2);

    std::thread::scope(|s| {
        let first = tracker.start_write(make_object(9), &reporter);

        let (tracker, reporter, release) = (&tracker, &reporter, &release);
        s.spawn(move || {
            go_rx.recv().expect("wait for first claim");
            let _guard = tracker.start_write(make_object(9), reporter);
            claimed_tx.send(()).expect("signal claim");
            release.wait();
        });

        go_tx.send(()).expect("start second thread");
        claimed_rx.recv().expect("wait for second claim");
        drop(first);
        {
            // The other thread still holds the object
            let _again = tracker.start_write(make_object(9), reporter);
        }
        release.wait();
    });

    assert_eq!(reporter.conflicts.load(Ordering::SeqCst), 2);
    assert_eq!(tracker.active(), 0);
}
