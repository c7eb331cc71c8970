//! Fork/join worker dispatch for the simulation's parallel phases.
//!
//! The simulation does not need a load balancing thread pool; phases have
//! their own domain-specific balancing and the dispatch count per step is
//! small. Any implementation that can run `worker_count` bodies to
//! completion and join them is sufficient.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Provides fork/join dispatch over worker indices. Workers run to
/// completion; the dispatch call returns after every worker body has
/// finished.
pub trait ThreadDispatcher: Sync {
    /// Number of workers dispatched by `dispatch`.
    fn thread_count(&self) -> usize;

    /// Invokes `body` once per worker index, concurrently, and joins.
    fn dispatch(&self, body: &(dyn Fn(usize) + Sync));
}

/// Runs every worker body inline on the calling thread. Useful for
/// debugging and for deterministic single-threaded replay.
pub struct SequentialDispatcher;

impl ThreadDispatcher for SequentialDispatcher {
    fn thread_count(&self) -> usize {
        1
    }

    fn dispatch(&self, body: &(dyn Fn(usize) + Sync)) {
        body(0);
    }
}

/// Spawns scoped threads for each dispatch. The calling thread acts as
/// worker 0.
pub struct ScopedDispatcher {
    thread_count: usize,
}

impl ScopedDispatcher {
    pub fn new(thread_count: usize) -> Self {
        Self {
            thread_count: thread_count.max(1),
        }
    }
}

impl ThreadDispatcher for ScopedDispatcher {
    fn thread_count(&self) -> usize {
        self.thread_count
    }

    fn dispatch(&self, body: &(dyn Fn(usize) + Sync)) {
        std::thread::scope(|scope| {
            for worker_index in 1..self.thread_count {
                scope.spawn(move || body(worker_index));
            }
            body(0);
        });
    }
}

/// Distributes `job_count` jobs across workers through a shared claim
/// cursor. Jobs are claimed dynamically, so stragglers do not serialize the
/// phase; `job` receives (worker_index, job_index).
pub fn dispatch_jobs(
    dispatcher: &dyn ThreadDispatcher,
    job_count: usize,
    job: &(dyn Fn(usize, usize) + Sync),
) {
    if job_count == 0 {
        return;
    }
    let cursor = CachePadded::new(AtomicUsize::new(0));
    dispatcher.dispatch(&|worker_index| loop {
        let job_index = cursor.fetch_add(1, Ordering::Relaxed);
        if job_index >= job_count {
            break;
        }
        job(worker_index, job_index);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn every_job_runs_exactly_once() {
        let dispatcher = ScopedDispatcher::new(4);
        let executions: Vec<AtomicU32> = (0..100).map(|_| AtomicU32::new(0)).collect();
        dispatch_jobs(&dispatcher, executions.len(), &|_, job_index| {
            executions[job_index].fetch_add(1, Ordering::Relaxed);
        });
        assert!(executions
            .iter()
            .all(|count| count.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn sequential_dispatcher_runs_inline() {
        let count = AtomicU32::new(0);
        SequentialDispatcher.dispatch(&|worker_index| {
            assert_eq!(worker_index, 0);
            count.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
