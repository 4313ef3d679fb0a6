//! Detection of externally synchronized objects used from two threads at once.

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use vkguard_protocol::{ObjectHandle, ReportFlags, ThreadingCheckerError};

use crate::debug_report::Reporter;

/// Claim depth per thread currently holding an object.
type Holders = HashMap<ThreadId, u32>;

#[derive(Default)]
pub struct ThreadTracker {
    holders: DashMap<ObjectHandle, Holders>,
}

/// Marks an object as in use by the current thread until dropped.
pub struct WriteGuard<'a> {
    tracker: &'a ThreadTracker,
    object: ObjectHandle,
    thread: ThreadId,
}

impl ThreadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `object` for the current thread. If any other thread holds it,
    /// a `THREADING_CHECKER_MULTIPLE_THREADS` error is reported; the call
    /// still proceeds and both claims stay recorded.
    pub fn start_write<'a, R: Reporter + ?Sized>(
        &'a self,
        object: ObjectHandle,
        reporter: &R,
    ) -> WriteGuard<'a> {
        let current = thread::current().id();
        let conflict = {
            let mut holders = self.holders.entry(object).or_default();
            *holders.entry(current).or_insert(0) += 1;
            holders
                .iter()
                .find(|&(&thread, &depth)| thread != current && depth > 0)
                .map(|(&thread, _)| thread)
        };

        if let Some(other) = conflict {
            let message = format!(
                "THREADING ERROR: {} is simultaneously used in thread {:?} and thread {:?}",
                object, other, current
            );
            reporter.report(
                ReportFlags::ERROR,
                object,
                ThreadingCheckerError::MultipleThreads.into(),
                &message,
            );
        }

        WriteGuard {
            tracker: self,
            object,
            thread: current,
        }
    }

    fn finish_write(&self, object: ObjectHandle, current: ThreadId) {
        let empty = match self.holders.get_mut(&object) {
            Some(mut holders) => {
                if let Some(depth) = holders.get_mut(&current) {
                    *depth = depth.saturating_sub(1);
                    if *depth == 0 {
                        holders.remove(&current);
                    }
                }
                holders.is_empty()
            }
            None => false,
        };
        if empty {
            self.holders.remove_if(&object, |_, holders| holders.is_empty());
        }
    }

    /// Number of objects currently claimed.
    pub fn active(&self) -> usize {
        self.holders.len()
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.tracker.finish_write(self.object, self.thread);
    }
}
