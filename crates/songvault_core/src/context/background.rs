//! Worker threads for fire-and-forget background tasks.
//!
//! # Invariants
//! - Tasks are never cancelled; once spawned they run to completion.
//! - A panicking task is logged when joined and never propagated.

use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

const WORKER_NAME_PREFIX: &str = "songvault-bg";

/// Spawns and tracks background worker threads.
#[derive(Default)]
pub struct BackgroundExecutor {
    workers: Mutex<Vec<(u64, JoinHandle<()>)>>,
    next_task: AtomicU64,
}

impl BackgroundExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` on a new named worker thread.
    ///
    /// Returns `false` when the OS refused to start a thread.
    pub fn spawn<F>(&self, work: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.reap_finished();

        let task = self.next_task.fetch_add(1, Ordering::Relaxed) + 1;
        let spawned = thread::Builder::new()
            .name(format!("{WORKER_NAME_PREFIX}-{task}"))
            .spawn(move || {
                let started_at = Instant::now();
                debug!("event=background_task module=context status=start task={task}");
                work();
                debug!(
                    "event=background_task module=context status=ok task={} duration_ms={}",
                    task,
                    started_at.elapsed().as_millis()
                );
            });

        match spawned {
            Ok(handle) => {
                self.workers.lock().push((task, handle));
                true
            }
            Err(err) => {
                error!(
                    "event=background_task module=context status=error task={} error_code=spawn_failed error={}",
                    task, err
                );
                false
            }
        }
    }

    /// Tasks spawned and not yet joined.
    pub fn in_flight(&self) -> usize {
        self.workers
            .lock()
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }

    /// Joins every outstanding task, including tasks spawned while waiting.
    ///
    /// Returns the number of tasks joined.
    pub fn wait_idle(&self) -> usize {
        let mut joined = 0;
        loop {
            let batch = std::mem::take(&mut *self.workers.lock());
            if batch.is_empty() {
                break;
            }
            for (task, handle) in batch {
                join_worker(task, handle);
                joined += 1;
            }
        }
        if joined > 0 {
            info!("event=background_wait module=context status=ok joined={joined}");
        }
        joined
    }

    fn reap_finished(&self) {
        let finished = {
            let mut workers = self.workers.lock();
            let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut *workers)
                .into_iter()
                .partition(|(_, handle)| handle.is_finished());
            *workers = running;
            finished
        };
        for (task, handle) in finished {
            join_worker(task, handle);
        }
    }
}

fn join_worker(task: u64, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!(
            "event=background_task module=context status=error task={} error_code=task_panicked",
            task
        );
    }
}

#[cfg(test)]
mod tests {
    use super::BackgroundExecutor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn wait_idle_joins_every_spawned_task() {
        let executor = BackgroundExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            assert!(executor.spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert_eq!(executor.wait_idle(), 4);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(executor.in_flight(), 0);
    }

    #[test]
    fn panicking_task_does_not_poison_executor() {
        let executor = BackgroundExecutor::new();
        executor.spawn(|| panic!("boom"));
        executor.wait_idle();

        let counter = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&counter);
        executor.spawn(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        executor.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
