//! Execution of file processors off the watcher thread.
//!
//! Two policies are available:
//! - `thread_per_file`: one OS thread per dispatched file, no cap. A burst of
//!   new files means a burst of threads.
//! - `worker_pool`: a fixed number of threads pulling from an unbounded job
//!   queue. Excess files wait in the queue; the watcher still never blocks.

use crossbeam_channel::{unbounded, Sender};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// A unit of work handed to the dispatcher.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// How dispatched files are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Spawn a dedicated thread for every file
    #[default]
    ThreadPerFile,
    /// Run files on a fixed set of worker threads
    WorkerPool { workers: usize },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("worker pool has shut down")]
    Closed,

    #[error("worker pool needs at least one worker")]
    NoWorkers,
}

enum Inner {
    ThreadPerFile,
    WorkerPool {
        jobs: Option<Sender<Job>>,
        workers: Vec<JoinHandle<()>>,
    },
}

/// Runs jobs according to a [`DispatchPolicy`].
pub struct Dispatcher {
    policy: DispatchPolicy,
    inner: Inner,
    dispatched: AtomicU64,
}

impl Dispatcher {
    pub fn new(policy: DispatchPolicy) -> Result<Self, DispatchError> {
        let inner = match policy {
            DispatchPolicy::ThreadPerFile => Inner::ThreadPerFile,
            DispatchPolicy::WorkerPool { workers: 0 } => return Err(DispatchError::NoWorkers),
            DispatchPolicy::WorkerPool { workers } => {
                let (tx, rx) = unbounded::<Job>();
                let handles = (0..workers)
                    .map(|i| {
                        let rx = rx.clone();
                        thread::Builder::new()
                            .name(format!("vitals-worker-{i}"))
                            .spawn(move || {
                                for job in rx.iter() {
                                    run_isolated(job);
                                }
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Inner::WorkerPool {
                    jobs: Some(tx),
                    workers: handles,
                }
            }
        };

        Ok(Self {
            policy,
            inner,
            dispatched: AtomicU64::new(0),
        })
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Jobs handed off so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Hand `job` off without waiting for it to start or finish.
    pub fn dispatch(&self, job: Job) -> Result<(), DispatchError> {
        let n = self.dispatched.fetch_add(1, Ordering::Relaxed);
        match &self.inner {
            Inner::ThreadPerFile => {
                thread::Builder::new()
                    .name(format!("vitals-file-{n}"))
                    .spawn(move || run_isolated(job))?;
            }
            Inner::WorkerPool { jobs, .. } => {
                jobs.as_ref()
                    .ok_or(DispatchError::Closed)?
                    .send(job)
                    .map_err(|_| DispatchError::Closed)?;
            }
        }
        Ok(())
    }

    /// Stop accepting jobs and wait for pool workers to finish queued work.
    ///
    /// Threads started under `thread_per_file` are detached and keep running.
    pub fn shutdown(mut self) {
        self.close_and_join();
    }

    fn close_and_join(&mut self) {
        if let Inner::WorkerPool { jobs, workers } = &mut self.inner {
            jobs.take();
            for worker in workers.drain(..) {
                if worker.join().is_err() {
                    tracing::error!("Worker thread panicked");
                }
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Close the queue but leave workers running queued jobs.
        if let Inner::WorkerPool { jobs, .. } = &mut self.inner {
            jobs.take();
        }
    }
}

/// Run a job, containing any panic to the job itself.
fn run_isolated(job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        tracing::error!("File processor panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::time::{Duration, Instant};

    fn wait_for(counter: &AtomicUsize, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) < expected && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_thread_per_file_runs_jobs_concurrently() {
        let dispatcher = Dispatcher::new(DispatchPolicy::ThreadPerFile).unwrap();
        let barrier = Arc::new(Barrier::new(4));
        let done = Arc::new(AtomicUsize::new(0));

        // All four jobs must be running at once to get past the barrier.
        for _ in 0..4 {
            let barrier = Arc::clone(&barrier);
            let done = Arc::clone(&done);
            dispatcher
                .dispatch(Box::new(move || {
                    barrier.wait();
                    done.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        wait_for(&done, 4);
        assert_eq!(done.load(Ordering::SeqCst), 4);
        assert_eq!(dispatcher.dispatched(), 4);
    }

    #[test]
    fn test_worker_pool_runs_every_job() {
        let dispatcher = Dispatcher::new(DispatchPolicy::WorkerPool { workers: 2 }).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let done = Arc::clone(&done);
            dispatcher
                .dispatch(Box::new(move || {
                    thread::sleep(Duration::from_millis(1));
                    done.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        dispatcher.shutdown();
        assert_eq!(done.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_panicking_job_does_not_kill_pool() {
        let dispatcher = Dispatcher::new(DispatchPolicy::WorkerPool { workers: 1 }).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        dispatcher.dispatch(Box::new(|| panic!("bad file"))).unwrap();
        let counter = Arc::clone(&done);
        dispatcher
            .dispatch(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        dispatcher.shutdown();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            Dispatcher::new(DispatchPolicy::WorkerPool { workers: 0 }),
            Err(DispatchError::NoWorkers)
        ));
    }

    #[test]
    fn test_policy_serde() {
        let policy: DispatchPolicy =
            serde_json::from_str(r#"{"mode":"worker_pool","workers":4}"#).unwrap();
        assert_eq!(policy, DispatchPolicy::WorkerPool { workers: 4 });
        let policy: DispatchPolicy = serde_json::from_str(r#"{"mode":"thread_per_file"}"#).unwrap();
        assert_eq!(policy, DispatchPolicy::ThreadPerFile);
    }
}
